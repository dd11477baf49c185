//! `show-plan`: print a plan and who each task would go to.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use crate::bus::MemoryBus;
use crate::config::AppConfig;
use crate::coordinator::{integration_cycle_plan, Assigner, Plan};

/// The plan at `path`, or the built-in integration plan over the first two
/// configured agents.
pub fn load_plan(path: Option<&Path>, config: &AppConfig) -> Result<Plan> {
    if let Some(path) = path {
        return Ok(Plan::from_json_file(path)?);
    }
    let ids = config.agent_ids();
    match ids.as_slice() {
        [] => bail!("no agents configured; pass --plan or add [[agents]] to the configuration"),
        [only] => Ok(integration_cycle_plan(only, only)),
        [inference, defi, ..] => Ok(integration_cycle_plan(inference, defi)),
    }
}

pub fn show_plan(path: Option<&Path>, config: &AppConfig) -> Result<()> {
    let plan = load_plan(path, config)?;
    print!("{}", render(&plan, config)?);
    Ok(())
}

fn render(plan: &Plan, config: &AppConfig) -> Result<String> {
    // resolution only; nothing is published
    let assigner = Assigner::new(
        Arc::new(MemoryBus::fast()),
        config.coordinator.task_topic,
        config.agent_ids(),
        config.coordinator.coordinator_id.clone(),
    );
    let resolved = assigner.resolve_assignees(plan)?;

    let mut out = format!(
        "\nPlan {} ({} tasks)\n",
        plan.festival_id,
        plan.task_count()
    );
    let mut resolved = resolved.into_iter();
    for seq in &plan.sequences {
        out.push_str(&format!("\n  {}\n", seq.id));
        for _ in &seq.tasks {
            let Some((task, agent)) = resolved.next() else {
                break;
            };
            out.push_str(&format!("    {:<24} -> {}", task.id, agent));
            if !task.name.is_empty() {
                out.push_str(&format!("  ({})", task.name));
            }
            if !task.dependencies.is_empty() {
                out.push_str(&format!("  after {}", task.dependencies.join(", ")));
            }
            out.push('\n');
        }
    }
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::AgentBinding;

    fn config_with(agents: &[(&str, &str)]) -> AppConfig {
        let mut config = AppConfig::load_from("/nonexistent-config-dir").unwrap();
        config.agents = agents
            .iter()
            .map(|(id, account)| AgentBinding::new(*id, *account))
            .collect();
        config
    }

    #[test]
    fn test_default_plan_uses_first_two_agents() {
        let config = config_with(&[("a", "0.0.1"), ("b", "0.0.2"), ("c", "0.0.3")]);
        let plan = load_plan(None, &config).unwrap();
        let assignees: Vec<&str> = plan.tasks().map(|t| t.assign_to.as_str()).collect();
        assert_eq!(assignees, vec!["a", "b"]);
    }

    #[test]
    fn test_default_plan_needs_an_agent() {
        assert!(load_plan(None, &config_with(&[])).is_err());
    }

    #[test]
    fn test_render_shows_assignees_and_dependencies() {
        let config = config_with(&[("inference-001", "0.0.4001"), ("defi-001", "0.0.4002")]);
        let plan = load_plan(None, &config).unwrap();
        let text = render(&plan, &config).unwrap();
        assert!(text.contains("Plan integration-cycle-001 (2 tasks)"));
        assert!(text.contains("-> inference-001"));
        assert!(text.contains("after task-inference-01"));
    }
}
