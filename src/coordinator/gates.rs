//! Quality gates checked before a task may complete.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::traits::QualityGate;
use crate::error::{CoordinatorError, Result};

/// Markers identifying tasks that are themselves quality gates.
const GATE_TASK_MARKERS: [&str; 4] = ["testing", "review", "iterate", "fest_commit"];

/// True for tasks whose id marks them as a gate step (testing, review, ...).
pub fn is_quality_gate_task(task_id: &str) -> bool {
    GATE_TASK_MARKERS
        .iter()
        .any(|marker| task_id.contains(marker))
}

/// Reference gate: lets every task through.
///
/// Gate tasks always pass. Ordinary implementation tasks also pass for now;
/// sequence-level checks belong in a richer gate plugged in through
/// [`QualityGate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleGateEnforcer;

impl SimpleGateEnforcer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QualityGate for SimpleGateEnforcer {
    async fn evaluate(&self, cancel: &CancellationToken, task_id: &str) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(format!(
                "evaluate gate for task {task_id}"
            )));
        }

        if is_quality_gate_task(task_id) {
            debug!(task_id, "gate task passes unconditionally");
            return Ok(true);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_task_detection() {
        assert!(is_quality_gate_task("seq-01-testing"));
        assert!(is_quality_gate_task("code_review_02"));
        assert!(is_quality_gate_task("iterate-3"));
        assert!(is_quality_gate_task("fest_commit"));
        assert!(!is_quality_gate_task("task-inference-01"));
    }

    #[tokio::test]
    async fn test_simple_gate_passes_all_tasks() {
        let gate = SimpleGateEnforcer::new();
        let cancel = CancellationToken::new();

        assert!(gate.evaluate(&cancel, "task-inference-01").await.unwrap());
        assert!(gate.evaluate(&cancel, "seq-01-review").await.unwrap());
        // repeatable
        assert!(gate.evaluate(&cancel, "task-inference-01").await.unwrap());
    }

    #[tokio::test]
    async fn test_simple_gate_fails_fast_when_cancelled() {
        let gate = SimpleGateEnforcer::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gate.evaluate(&cancel, "t-1").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("evaluate gate for task t-1"));
    }
}
