//! Progress monitor: folds agent status updates into per-task lifecycle state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{transition, TaskStatus};
use super::traits::{ProgressMonitor, QualityGate};
use crate::bus::MessageSubscriber;
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::{Envelope, MessageType, StatusUpdatePayload};

pub struct Monitor {
    subscriber: Arc<dyn MessageSubscriber>,
    topic: TopicId,
    gate: Option<Arc<dyn QualityGate>>,
    gate_timeout: Duration,
    states: RwLock<HashMap<String, TaskStatus>>,
}

enum GateVerdict {
    Passed,
    Rejected,
    Cancelled,
}

impl Monitor {
    pub fn new(
        subscriber: Arc<dyn MessageSubscriber>,
        topic: TopicId,
        gate: Option<Arc<dyn QualityGate>>,
        gate_timeout: Duration,
    ) -> Self {
        Self {
            subscriber,
            topic,
            gate,
            gate_timeout,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Seed `task_id` as `pending`, overwriting any previous state.
    pub async fn init_task(&self, task_id: &str) {
        self.states
            .write()
            .await
            .insert(task_id.to_string(), TaskStatus::Pending);
    }

    /// Apply one envelope from the status topic. Anything that is not a
    /// well-formed status update is dropped.
    pub async fn handle_envelope(&self, cancel: &CancellationToken, envelope: &Envelope) {
        if envelope.message_type != MessageType::StatusUpdate {
            return;
        }

        let mut update: StatusUpdatePayload = match envelope.decode_payload() {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "dropping undecodable status update");
                return;
            }
        };
        if update.task_id.is_empty() {
            update.task_id = envelope.task_id.clone();
        }
        if update.task_id.is_empty() {
            warn!(sender = %envelope.sender, seq = envelope.sequence_num, "status update without task id");
            return;
        }

        if update.new_status == TaskStatus::Complete {
            if let Some(gate) = &self.gate {
                match self.run_gate(gate.as_ref(), cancel, &update.task_id).await {
                    GateVerdict::Passed => {}
                    GateVerdict::Cancelled => return,
                    GateVerdict::Rejected => {
                        self.states
                            .write()
                            .await
                            .insert(update.task_id.clone(), TaskStatus::InProgress);
                        info!(task_id = %update.task_id, agent_id = %update.agent_id, "quality gate rejected completion; task back in progress");
                        return;
                    }
                }
            }
        }

        let mut states = self.states.write().await;
        let current = states
            .get(&update.task_id)
            .copied()
            .unwrap_or(TaskStatus::Pending);

        if let Err(e) = transition(current, update.new_status) {
            debug!(
                task_id = %update.task_id,
                agent_id = %update.agent_id,
                error = %e,
                "discarding status update"
            );
            return;
        }

        states.insert(update.task_id.clone(), update.new_status);
        info!(
            task_id = %update.task_id,
            agent_id = %update.agent_id,
            from = %current,
            to = %update.new_status,
            "task status changed"
        );
    }

    /// Evaluate the gate under the configured timeout. Runs before the state
    /// lock is taken so a slow gate never blocks readers.
    async fn run_gate(
        &self,
        gate: &dyn QualityGate,
        cancel: &CancellationToken,
        task_id: &str,
    ) -> GateVerdict {
        let evaluation = tokio::select! {
            _ = cancel.cancelled() => return GateVerdict::Cancelled,
            res = tokio::time::timeout(self.gate_timeout, gate.evaluate(cancel, task_id)) => res,
        };

        match evaluation {
            Ok(Ok(true)) => GateVerdict::Passed,
            Ok(Ok(false)) => GateVerdict::Rejected,
            Ok(Err(e)) if e.is_cancelled() => GateVerdict::Cancelled,
            Ok(Err(e)) => {
                warn!(task_id, error = %e, "quality gate evaluation failed");
                GateVerdict::Rejected
            }
            Err(_) => {
                warn!(task_id, timeout_ms = self.gate_timeout.as_millis() as u64, "quality gate evaluation timed out");
                GateVerdict::Rejected
            }
        }
    }
}

#[async_trait]
impl ProgressMonitor for Monitor {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled("monitor start"));
        }

        let mut sub = self.subscriber.subscribe(&cancel, self.topic);
        let mut errors_open = true;
        info!(topic = %self.topic, "progress monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("progress monitor stopped");
                    return Ok(());
                }
                msg = sub.messages.recv() => match msg {
                    Some(envelope) => self.handle_envelope(&cancel, &envelope).await,
                    None => {
                        warn!(topic = %self.topic, "status subscription closed; progress monitor exiting");
                        return Ok(());
                    }
                },
                err = sub.errors.recv(), if errors_open => match err {
                    Some(e) => warn!(error = %e, "status subscription error"),
                    None => errors_open = false,
                },
            }
        }
    }

    async fn task_state(&self, task_id: &str) -> Result<TaskStatus> {
        self.states
            .read()
            .await
            .get(task_id)
            .copied()
            .ok_or_else(|| CoordinatorError::NotTracked {
                what: "task",
                id: task_id.to_string(),
            })
    }

    async fn all_task_states(&self) -> HashMap<String, TaskStatus> {
        self.states.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::gates::SimpleGateEnforcer;
    use crate::coordinator::test_support::ChannelSubscriber;
    use crate::coordinator::traits::MockQualityGate;
    use serde_json::json;

    const TOPIC: TopicId = TopicId::new(0, 0, 1002);

    fn monitor_with(gate: Option<Arc<dyn QualityGate>>) -> Monitor {
        let (subscriber, _, _) = ChannelSubscriber::new();
        Monitor::new(Arc::new(subscriber), TOPIC, gate, Duration::from_secs(5))
    }

    fn update(task_id: &str, status: &str) -> Envelope {
        Envelope::new(MessageType::StatusUpdate, "agent-1", 1)
            .with_task_id(task_id)
            .with_payload(&json!({
                "task_id": task_id,
                "agent_id": "agent-1",
                "new_status": status
            }))
            .unwrap()
    }

    async fn walk(monitor: &Monitor, task_id: &str, statuses: &[&str]) {
        let cancel = CancellationToken::new();
        for status in statuses {
            monitor.handle_envelope(&cancel, &update(task_id, status)).await;
        }
    }

    #[tokio::test]
    async fn test_init_and_query() {
        let monitor = monitor_with(None);
        monitor.init_task("task-1").await;

        assert_eq!(monitor.task_state("task-1").await.unwrap(), TaskStatus::Pending);
        let err = monitor.task_state("nonexistent").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotTracked { .. }));
    }

    #[tokio::test]
    async fn test_all_task_states_returns_copy() {
        let monitor = monitor_with(None);
        monitor.init_task("task-1").await;
        monitor.init_task("task-2").await;

        let mut states = monitor.all_task_states().await;
        assert_eq!(states.len(), 2);
        states.insert("task-1".into(), TaskStatus::Paid);

        assert_eq!(monitor.task_state("task-1").await.unwrap(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_happy_path_reaches_complete() {
        let monitor = monitor_with(Some(Arc::new(SimpleGateEnforcer::new())));
        walk(&monitor, "t-1", &["assigned", "in_progress", "review", "complete"]).await;

        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::Complete);
    }

    #[tokio::test]
    async fn test_untracked_task_starts_from_pending() {
        let monitor = monitor_with(None);
        walk(&monitor, "t-new", &["assigned"]).await;
        assert_eq!(monitor.task_state("t-new").await.unwrap(), TaskStatus::Assigned);
    }

    #[tokio::test]
    async fn test_invalid_and_duplicate_updates_are_discarded() {
        let monitor = monitor_with(None);
        monitor.init_task("t-1").await;

        walk(&monitor, "t-1", &["complete"]).await;
        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::Pending);

        walk(&monitor, "t-1", &["assigned", "assigned"]).await;
        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::Assigned);
    }

    #[tokio::test]
    async fn test_failing_gate_forces_in_progress() {
        let mut gate = MockQualityGate::new();
        gate.expect_evaluate().times(1).returning(|_, _| Ok(false));
        let monitor = monitor_with(Some(Arc::new(gate)));

        walk(&monitor, "t-1", &["assigned", "in_progress", "review", "complete"]).await;

        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_gate_error_counts_as_failure() {
        let mut gate = MockQualityGate::new();
        gate.expect_evaluate()
            .returning(|_, _| Err(CoordinatorError::Internal("gate backend down".into())));
        let monitor = monitor_with(Some(Arc::new(gate)));

        walk(&monitor, "t-1", &["assigned", "in_progress", "review", "complete"]).await;

        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::InProgress);
    }

    struct SlowGate;

    #[async_trait]
    impl QualityGate for SlowGate {
        async fn evaluate(&self, _cancel: &CancellationToken, _task_id: &str) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_gate_timeout_counts_as_failure() {
        let (subscriber, _, _) = ChannelSubscriber::new();
        let monitor = Monitor::new(
            Arc::new(subscriber),
            TOPIC,
            Some(Arc::new(SlowGate)),
            Duration::from_millis(20),
        );

        walk(&monitor, "t-1", &["assigned", "in_progress", "review", "complete"]).await;

        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_cancellation_during_gate_leaves_state_untouched() {
        let (subscriber, _, _) = ChannelSubscriber::new();
        let monitor = Monitor::new(
            Arc::new(subscriber),
            TOPIC,
            Some(Arc::new(SlowGate)),
            Duration::from_secs(30),
        );
        walk(&monitor, "t-1", &["assigned", "in_progress", "review"]).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        monitor.handle_envelope(&cancel, &update("t-1", "complete")).await;

        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::Review);
    }

    #[tokio::test]
    async fn test_non_status_messages_and_garbage_are_ignored() {
        let monitor = monitor_with(None);
        let cancel = CancellationToken::new();

        let result = Envelope::new(MessageType::TaskResult, "agent-1", 3)
            .with_payload(&json!({"task_id": "t-1", "status": "completed"}))
            .unwrap();
        monitor.handle_envelope(&cancel, &result).await;
        let garbage = Envelope::new(MessageType::StatusUpdate, "agent-1", 4)
            .with_payload(&json!({"task_id": "t-1", "new_status": "exploded"}))
            .unwrap();
        monitor.handle_envelope(&cancel, &garbage).await;

        assert!(monitor.all_task_states().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_consumes_subscription_until_cancelled() {
        let (subscriber, msg_tx, err_tx) = ChannelSubscriber::new();
        let monitor = Arc::new(Monitor::new(
            Arc::new(subscriber),
            TOPIC,
            None,
            Duration::from_secs(5),
        ));
        let cancel = CancellationToken::new();
        let handle = {
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.start(cancel).await })
        };

        err_tx
            .send(CoordinatorError::Transport("blip".into()))
            .await
            .unwrap();
        msg_tx.send(update("t-1", "assigned")).await.unwrap();

        for _ in 0..100 {
            if monitor.task_state("t-1").await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(monitor.task_state("t-1").await.unwrap(), TaskStatus::Assigned);

        cancel.cancel();
        tokio_test::assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_start_fails_fast_when_cancelled() {
        let monitor = monitor_with(None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tokio_test::assert_err!(monitor.start(cancel).await);
        assert!(err.is_cancelled());
    }
}
