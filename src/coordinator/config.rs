//! Coordinator Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ledger::{AccountId, TokenId, TopicId};

/// Configuration for the coordination engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Sender id stamped on every envelope the coordinator publishes
    pub coordinator_id: String,
    /// Topic for task assignments and payment notifications
    pub task_topic: TopicId,
    /// Topic agents report status updates and results on
    pub status_topic: TopicId,
    /// Token used for agent payments
    pub payment_token: TokenId,
    /// Account holding the payment token supply
    pub treasury_account: AccountId,
    /// Token amount paid per completed task (default: 100)
    pub default_payment_amount: i64,
    /// Upper bound on one quality gate evaluation (default: 30s)
    pub quality_gate_timeout_ms: u64,
    /// Run the quality gate before accepting `complete`
    pub quality_gates_enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            coordinator_id: "coordinator".to_string(),
            task_topic: TopicId::default(),
            status_topic: TopicId::default(),
            payment_token: TokenId::default(),
            treasury_account: AccountId::default(),
            default_payment_amount: 100,
            quality_gate_timeout_ms: 30_000,
            quality_gates_enabled: true,
        }
    }
}

/// One agent the coordinator hands work to, and the account it is paid into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBinding {
    pub id: String,
    pub account: String,
}

impl AgentBinding {
    pub fn new(id: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account: account.into(),
        }
    }
}

impl CoordinatorConfig {
    pub fn quality_gate_timeout(&self) -> Duration {
        Duration::from_millis(self.quality_gate_timeout_ms)
    }

    /// Collect every problem rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.coordinator_id.trim().is_empty() {
            errors.push("coordinator: coordinator_id is required".to_string());
        }
        if self.task_topic.is_unset() {
            errors.push("coordinator: task topic ID is required".to_string());
        }
        if self.status_topic.is_unset() {
            errors.push("coordinator: status topic ID is required".to_string());
        }
        if self.payment_token.is_unset() {
            errors.push("coordinator: payment token ID is required".to_string());
        }
        if self.treasury_account.is_unset() {
            errors.push("coordinator: treasury account ID is required".to_string());
        }
        if self.default_payment_amount <= 0 {
            errors.push("coordinator: default payment amount must be positive".to_string());
        }
        if self.quality_gate_timeout_ms == 0 {
            errors.push("coordinator: quality_gate_timeout_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CoordinatorConfig {
        CoordinatorConfig {
            task_topic: TopicId::new(0, 0, 1001),
            status_topic: TopicId::new(0, 0, 1002),
            payment_token: TokenId::new(0, 0, 2001),
            treasury_account: AccountId::new(0, 0, 3001),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.default_payment_amount, 100);
        assert_eq!(config.quality_gate_timeout(), Duration::from_secs(30));
        assert!(config.quality_gates_enabled);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_all_problems_reported() {
        let config = CoordinatorConfig {
            default_payment_amount: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("task topic")));
        assert!(errors.iter().any(|e| e.contains("payment amount")));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let config = CoordinatorConfig {
            default_payment_amount: -5,
            ..valid()
        };
        assert_eq!(config.validate().unwrap_err().len(), 1);
    }
}
