//! `check-config`: load, summarize and validate configuration.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::AppConfig;

pub fn check_config(config_dir: &Path) -> Result<()> {
    let config = AppConfig::load_from(config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))?;

    println!("\n\x1b[36mConfiguration ({})\x1b[0m\n", config_dir.display());
    print!("{}", summarize(&config));

    match config.validate() {
        Ok(()) => {
            println!("\n  \x1b[32m✓ Configuration is valid\x1b[0m\n");
            Ok(())
        }
        Err(errors) => {
            println!();
            for e in &errors {
                println!("  \x1b[31m✗ {}\x1b[0m", e);
            }
            println!();
            bail!("{} configuration problem(s)", errors.len())
        }
    }
}

fn summarize(config: &AppConfig) -> String {
    let c = &config.coordinator;
    let mut out = String::new();
    out.push_str(&format!("  coordinator id     {}\n", c.coordinator_id));
    out.push_str(&format!("  task topic         {}\n", c.task_topic));
    out.push_str(&format!("  status topic       {}\n", c.status_topic));
    out.push_str(&format!("  payment token      {}\n", c.payment_token));
    out.push_str(&format!("  treasury account   {}\n", c.treasury_account));
    out.push_str(&format!("  payment per task   {}\n", c.default_payment_amount));
    out.push_str(&format!(
        "  quality gates      {} (timeout {}ms)\n",
        if c.quality_gates_enabled { "on" } else { "off" },
        c.quality_gate_timeout_ms
    ));
    out.push_str(&format!(
        "  liveness           {}\n",
        if config.liveness.enabled {
            config.liveness.address.as_str()
        } else {
            "disabled"
        }
    ));
    out.push_str(&format!("  agents             {}\n", config.agents.len()));
    for agent in &config.agents {
        out.push_str(&format!("    - {} -> {}\n", agent.id, agent.account));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::AgentBinding;
    use crate::ledger::TopicId;

    #[test]
    fn test_summary_lists_agents() {
        let mut config = AppConfig::load_from("/nonexistent-config-dir").unwrap();
        config.coordinator.task_topic = TopicId::new(0, 0, 1001);
        config.agents = vec![AgentBinding::new("inference-001", "0.0.4001")];

        let summary = summarize(&config);
        assert!(summary.contains("task topic         0.0.1001"));
        assert!(summary.contains("- inference-001 -> 0.0.4001"));
        assert!(summary.contains("liveness           disabled"));
    }

    #[test]
    fn test_invalid_config_fails() {
        assert!(check_config(Path::new("/nonexistent-config-dir")).is_err());
    }
}
