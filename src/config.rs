use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::bus::{PublishConfig, SubscribeConfig};
use crate::coordinator::{AgentBinding, CoordinatorConfig};
use crate::ledger::AccountId;
use crate::liveness::LivenessConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Agents the coordinator hands work to
    #[serde(default)]
    pub agents: Vec<AgentBinding>,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub subscribe: SubscribeConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("coordinator.coordinator_id", "coordinator")?
            .set_default("coordinator.default_payment_amount", 100)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("COORD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (COORD__COORDINATOR__TASK_TOPIC, etc.)
            .add_source(
                Environment::with_prefix("COORD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Agent ids in configuration order; the round-robin order.
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    /// Agent id → payment account.
    pub fn agent_accounts(&self) -> HashMap<String, String> {
        self.agents
            .iter()
            .map(|a| (a.id.clone(), a.account.clone()))
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.coordinator.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.liveness.validate() {
            errors.append(&mut e);
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                errors.push("agents: agent id is required".to_string());
                continue;
            }
            if !seen.insert(agent.id.as_str()) {
                errors.push(format!("agents: duplicate agent id {}", agent.id));
            }
            if let Err(e) = agent.account.parse::<AccountId>() {
                errors.push(format!("agents: {}: {}", agent.id, e));
            }
        }

        if self.publish.max_backoff_ms < self.publish.base_backoff_ms {
            errors.push("publish: max_backoff_ms must be at least base_backoff_ms".to_string());
        }
        if self.subscribe.message_buffer == 0 {
            errors.push("subscribe: message_buffer must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
