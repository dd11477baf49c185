//! Scripted local agents.
//!
//! A [`SimulatedAgent`] listens on the task topic for assignments addressed to
//! it and plays a fixed script on the status topic: `assigned`, `in_progress`,
//! `review`, `complete`, then a `completed` task result. It lets the engine run
//! end-to-end without real agents.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{MessagePublisher, MessageSubscriber};
use crate::coordinator::TaskStatus;
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::{
    Envelope, MessageType, PaymentSettledPayload, PnlReportPayload, StatusUpdatePayload,
    TaskAssignmentPayload, TaskResultPayload, RESULT_STATUS_COMPLETED,
};

/// Statuses reported, in order, for every assigned task.
const SCRIPT: [TaskStatus; 4] = [
    TaskStatus::Assigned,
    TaskStatus::InProgress,
    TaskStatus::Review,
    TaskStatus::Complete,
];

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub task_topic: TopicId,
    pub status_topic: TopicId,
    /// Pause between scripted messages
    pub step_delay: Duration,
    /// Publish every task result twice, as an at-least-once transport may
    pub duplicate_results: bool,
    /// Follow each result with a PnL report
    pub pnl_reports: bool,
}

impl SimulationConfig {
    pub fn new(task_topic: TopicId, status_topic: TopicId) -> Self {
        Self {
            task_topic,
            status_topic,
            step_delay: Duration::from_millis(50),
            duplicate_results: false,
            pnl_reports: false,
        }
    }
}

pub struct SimulatedAgent {
    id: String,
    publisher: Arc<dyn MessagePublisher>,
    subscriber: Arc<dyn MessageSubscriber>,
    config: SimulationConfig,
    seq_num: AtomicU64,
    completed: AtomicU64,
}

impl SimulatedAgent {
    pub fn new(
        id: impl Into<String>,
        publisher: Arc<dyn MessagePublisher>,
        subscriber: Arc<dyn MessageSubscriber>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            id: id.into(),
            publisher,
            subscriber,
            config,
            seq_num: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tasks this agent has reported as completed.
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Serve assignments until cancelled. Each task id is worked once even if
    /// its assignment is delivered again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut sub = self.subscriber.subscribe(&cancel, self.config.task_topic);
        let mut seen = HashSet::new();
        let mut errors_open = true;
        info!(agent_id = %self.id, "simulated agent started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = sub.messages.recv() => match msg {
                    Some(envelope) => {
                        if let Err(e) = self.handle_envelope(&cancel, &envelope, &mut seen).await {
                            if e.is_cancelled() {
                                return Ok(());
                            }
                            warn!(agent_id = %self.id, error = %e, "simulated task failed");
                        }
                    }
                    None => return Ok(()),
                },
                err = sub.errors.recv(), if errors_open => match err {
                    Some(e) => debug!(agent_id = %self.id, error = %e, "task subscription error"),
                    None => errors_open = false,
                },
            }
        }
    }

    async fn handle_envelope(
        &self,
        cancel: &CancellationToken,
        envelope: &Envelope,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        if envelope.recipient != self.id {
            return Ok(());
        }

        match envelope.message_type {
            MessageType::TaskAssignment => {
                let assignment: TaskAssignmentPayload = envelope.decode_payload()?;
                if !seen.insert(assignment.task_id.clone()) {
                    debug!(agent_id = %self.id, task_id = %assignment.task_id, "assignment replayed");
                    return Ok(());
                }
                self.work(cancel, &assignment).await
            }
            MessageType::PaymentSettled => {
                let settled: PaymentSettledPayload = envelope.decode_payload()?;
                info!(
                    agent_id = %self.id,
                    task_id = %settled.task_id,
                    amount = settled.amount,
                    token_id = %settled.token_id,
                    "payment received"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn work(&self, cancel: &CancellationToken, assignment: &TaskAssignmentPayload) -> Result<()> {
        let started = Instant::now();
        let task_id = assignment.task_id.as_str();
        info!(agent_id = %self.id, task_id, name = %assignment.task_name, "working task");

        for status in SCRIPT {
            self.pause(cancel).await?;
            let update = StatusUpdatePayload {
                task_id: task_id.to_string(),
                agent_id: self.id.clone(),
                new_status: status,
                message: format!("{} {}", self.id, status),
            };
            self.send(cancel, MessageType::StatusUpdate, task_id, &update)
                .await?;
        }

        let result = TaskResultPayload {
            task_id: task_id.to_string(),
            status: RESULT_STATUS_COMPLETED.to_string(),
            output: format!("simulated output for {}", assignment.task_name),
            error: String::new(),
            duration_ms: started.elapsed().as_millis() as i64,
            tx_hash: String::new(),
        };
        self.send(cancel, MessageType::TaskResult, task_id, &result)
            .await?;
        if self.config.duplicate_results {
            self.send(cancel, MessageType::TaskResult, task_id, &result)
                .await?;
        }
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        if self.config.pnl_reports {
            let report = PnlReportPayload {
                agent_id: self.id.clone(),
                net_pnl: Decimal::ZERO,
                trade_count: completed,
                is_self_sustaining: false,
                active_strategy: "simulated".to_string(),
            };
            self.send(cancel, MessageType::PnlReport, "", &report).await?;
        }
        Ok(())
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CoordinatorError::cancelled(format!("simulated agent {}", self.id))),
            _ = tokio::time::sleep(self.config.step_delay) => Ok(()),
        }
    }

    async fn send<T: serde::Serialize>(
        &self,
        cancel: &CancellationToken,
        message_type: MessageType,
        task_id: &str,
        payload: &T,
    ) -> Result<()> {
        let seq = self.seq_num.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = Envelope::new(message_type, &self.id, seq)
            .with_task_id(task_id)
            .with_payload(payload)?;
        self.publisher
            .publish(cancel, self.config.status_topic, &envelope)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    const TASKS: TopicId = TopicId::new(0, 0, 1001);
    const STATUS: TopicId = TopicId::new(0, 0, 1002);

    fn agent(bus: &Arc<MemoryBus>, duplicate_results: bool) -> SimulatedAgent {
        let mut config = SimulationConfig::new(TASKS, STATUS);
        config.step_delay = Duration::from_millis(1);
        config.duplicate_results = duplicate_results;
        config.pnl_reports = true;
        SimulatedAgent::new("sim-1", bus.clone(), bus.clone(), config)
    }

    fn assignment(task_id: &str, recipient: &str, seq: u64) -> Envelope {
        Envelope::new(MessageType::TaskAssignment, "coordinator", seq)
            .with_recipient(recipient)
            .with_task_id(task_id)
            .with_payload(&TaskAssignmentPayload {
                task_id: task_id.to_string(),
                task_name: "demo".into(),
                agent_id: recipient.to_string(),
                dependencies: vec![],
            })
            .unwrap()
    }

    async fn wait_for(bus: &MemoryBus, count: usize) -> Vec<Envelope> {
        for _ in 0..200 {
            let envelopes = bus.transport().envelopes(STATUS).await;
            if envelopes.len() >= count {
                return envelopes;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.transport().envelopes(STATUS).await
    }

    #[tokio::test]
    async fn test_agent_plays_script_for_its_assignments_only() {
        let bus = Arc::new(MemoryBus::fast());
        let agent = Arc::new(agent(&bus, false));
        let cancel = CancellationToken::new();
        let cancel_run = cancel.clone();
        let runner = agent.clone();
        let handle = tokio::spawn(async move { runner.run(cancel_run).await });

        bus.publish(&cancel, TASKS, &assignment("t-other", "sim-2", 1))
            .await
            .unwrap();
        bus.publish(&cancel, TASKS, &assignment("t-1", "sim-1", 2))
            .await
            .unwrap();
        // replayed delivery of the same assignment
        bus.publish(&cancel, TASKS, &assignment("t-1", "sim-1", 2))
            .await
            .unwrap();

        // 4 status updates, 1 result, 1 pnl report
        let envelopes = wait_for(&bus, 6).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio_test::assert_ok!(handle.await.unwrap());

        let envelopes_after = bus.transport().envelopes(STATUS).await;
        assert_eq!(envelopes_after.len(), 6);
        let statuses: Vec<TaskStatus> = envelopes
            .iter()
            .filter(|e| e.message_type == MessageType::StatusUpdate)
            .map(|e| e.decode_payload::<StatusUpdatePayload>().unwrap().new_status)
            .collect();
        assert_eq!(statuses, SCRIPT.to_vec());
        assert!(envelopes.iter().all(|e| e.task_id != "t-other"));
        assert_eq!(agent.completed_count(), 1);

        let seqs: Vec<u64> = envelopes_after.iter().map(|e| e.sequence_num).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_duplicate_results_are_published_twice() {
        let bus = Arc::new(MemoryBus::fast());
        let agent = Arc::new(agent(&bus, true));
        let cancel = CancellationToken::new();
        let cancel_run = cancel.clone();
        let runner = agent.clone();
        let handle = tokio::spawn(async move { runner.run(cancel_run).await });

        bus.publish(&cancel, TASKS, &assignment("t-1", "sim-1", 1))
            .await
            .unwrap();
        let envelopes = wait_for(&bus, 7).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let results = envelopes
            .iter()
            .filter(|e| e.message_type == MessageType::TaskResult)
            .count();
        assert_eq!(results, 2);
    }
}
