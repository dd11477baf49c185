//! Payload shapes, keyed by [`MessageType`](super::MessageType).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::coordinator::state::TaskStatus;

/// Result status an agent reports for a successfully finished task.
pub const RESULT_STATUS_COMPLETED: &str = "completed";

/// `task_assignment`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignmentPayload {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_name: String,
    pub agent_id: String,
    /// Advisory only; the coordinator does not order assignments by it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// `status_update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    pub task_id: String,
    #[serde(default)]
    pub agent_id: String,
    pub new_status: TaskStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// `task_result`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResultPayload {
    pub task_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub duration_ms: i64,
    /// Optional proof-of-work reference (e.g. an on-chain transaction hash).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tx_hash: String,
}

impl TaskResultPayload {
    pub fn is_completed(&self) -> bool {
        self.status == RESULT_STATUS_COMPLETED
    }
}

/// `payment_settled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettledPayload {
    pub task_id: String,
    pub agent_id: String,
    pub amount: i64,
    pub token_id: String,
    pub tx_status: String,
}

/// `pnl_report`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlReportPayload {
    pub agent_id: String,
    /// JSON number on the wire
    #[serde(with = "rust_decimal::serde::float")]
    pub net_pnl: Decimal,
    #[serde(default)]
    pub trade_count: u64,
    #[serde(default)]
    pub is_self_sustaining: bool,
    #[serde(default)]
    pub active_strategy: String,
}
