//! Component interfaces of the coordination engine.
//!
//! Each component is consumed through one of these traits so the runtime and
//! tests can swap implementations. All operations take the run's
//! `CancellationToken` and fail fast once it has fired.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use super::payment::SettlementOutcome;
use super::plan::Plan;
use super::state::{PaymentState, TaskStatus};
use crate::error::Result;

/// Hands plan tasks to agents over the task topic.
#[async_trait]
pub trait TaskAssigner: Send + Sync {
    /// Assign every task in plan order. On failure the error is a
    /// `PartialAssignment` carrying the ids assigned before it.
    async fn assign_tasks(&self, cancel: &CancellationToken, plan: &Plan) -> Result<Vec<String>>;

    /// Publish one assignment and record it once the publish succeeded.
    async fn assign_task(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        agent_id: &str,
    ) -> Result<()>;
}

/// Tracks task lifecycle from agent status updates.
#[async_trait]
pub trait ProgressMonitor: Send + Sync {
    /// Consume the status topic until cancelled.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    async fn task_state(&self, task_id: &str) -> Result<TaskStatus>;

    /// Independent snapshot of every tracked task.
    async fn all_task_states(&self) -> HashMap<String, TaskStatus>;
}

/// Decides whether a task may move to `complete`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QualityGate: Send + Sync {
    /// `Ok(true)` when the gate passes. Must not mutate monitor state.
    async fn evaluate(&self, cancel: &CancellationToken, task_id: &str) -> Result<bool>;
}

/// Settles payments for completed tasks, at most once per task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentManager: Send + Sync {
    async fn pay_for_task(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        agent_id: &str,
        amount: i64,
    ) -> Result<SettlementOutcome>;

    async fn payment_status(&self, task_id: &str) -> Result<PaymentState>;
}
