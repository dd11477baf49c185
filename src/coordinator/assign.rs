//! Task assignment over the task topic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::plan::{Plan, PlanTask};
use super::traits::TaskAssigner;
use crate::bus::MessagePublisher;
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::{Envelope, MessageType, TaskAssignmentPayload};

/// Publishes task assignments and remembers who got what.
pub struct Assigner {
    publisher: Arc<dyn MessagePublisher>,
    topic: TopicId,
    agent_ids: Vec<String>,
    sender_id: String,
    assignments: RwLock<HashMap<String, String>>,
    seq_num: AtomicU64,
}

impl Assigner {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        topic: TopicId,
        agent_ids: Vec<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            topic,
            agent_ids,
            sender_id: sender_id.into(),
            assignments: RwLock::new(HashMap::new()),
            seq_num: AtomicU64::new(0),
        }
    }

    /// Agent recorded for `task_id`, if its assignment was published.
    pub async fn assignment(&self, task_id: &str) -> Option<String> {
        self.assignments.read().await.get(task_id).cloned()
    }

    pub async fn assignment_count(&self) -> usize {
        self.assignments.read().await.len()
    }

    /// Copy of every recorded assignment.
    pub async fn assignments(&self) -> HashMap<String, String> {
        self.assignments.read().await.clone()
    }

    /// Resolve assignees for `plan` without publishing: explicit `assign_to`,
    /// else round-robin over the agent list with one index for the whole plan.
    pub fn resolve_assignees<'p>(&self, plan: &'p Plan) -> Result<Vec<(&'p PlanTask, String)>> {
        let mut next_agent = 0usize;
        let mut resolved = Vec::with_capacity(plan.task_count());
        for task in plan.tasks() {
            let agent = self.pick_agent(task, &mut next_agent)?;
            resolved.push((task, agent));
        }
        Ok(resolved)
    }

    fn pick_agent(&self, task: &PlanTask, next_agent: &mut usize) -> Result<String> {
        if !task.assign_to.is_empty() {
            return Ok(task.assign_to.clone());
        }
        if self.agent_ids.is_empty() {
            return Err(CoordinatorError::Validation(format!(
                "task {} has no assignee and no agents are configured",
                task.id
            )));
        }
        let agent = self.agent_ids[*next_agent % self.agent_ids.len()].clone();
        *next_agent += 1;
        Ok(agent)
    }

    async fn publish_assignment(
        &self,
        cancel: &CancellationToken,
        payload: TaskAssignmentPayload,
    ) -> Result<()> {
        let task_id = payload.task_id.clone();
        let agent_id = payload.agent_id.clone();
        let op = || format!("assign task {task_id} to {agent_id}");

        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(op()));
        }

        let seq = self.seq_num.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = Envelope::new(MessageType::TaskAssignment, &self.sender_id, seq)
            .with_recipient(&agent_id)
            .with_task_id(&task_id)
            .with_payload(&payload)
            .map_err(|e| e.context(format!("{}: marshal payload", op())))?;

        self.publisher
            .publish(cancel, self.topic, &envelope)
            .await
            .map_err(|e| e.context(format!("{}: publish", op())))?;

        self.assignments
            .write()
            .await
            .insert(task_id.clone(), agent_id.clone());
        debug!(task_id = %task_id, agent_id = %agent_id, seq, "task assigned");
        Ok(())
    }
}

#[async_trait]
impl TaskAssigner for Assigner {
    async fn assign_tasks(&self, cancel: &CancellationToken, plan: &Plan) -> Result<Vec<String>> {
        let mut assigned = Vec::new();

        if cancel.is_cancelled() {
            let err = CoordinatorError::cancelled(format!(
                "assign tasks for plan {}",
                plan.festival_id
            ));
            return Err(CoordinatorError::partial_assignment(assigned, err));
        }

        let mut next_agent = 0usize;
        for task in plan.tasks() {
            if cancel.is_cancelled() {
                let err = CoordinatorError::cancelled("assign tasks: cancelled during assignment");
                return Err(CoordinatorError::partial_assignment(assigned, err));
            }

            let agent_id = match self.pick_agent(task, &mut next_agent) {
                Ok(agent) => agent,
                Err(e) => {
                    return Err(CoordinatorError::partial_assignment(
                        assigned,
                        e.context("assign tasks"),
                    ))
                }
            };

            let payload = TaskAssignmentPayload {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                agent_id,
                dependencies: task.dependencies.clone(),
            };
            if let Err(e) = self.publish_assignment(cancel, payload).await {
                let err = e.context(format!("assign tasks: task {}", task.id));
                return Err(CoordinatorError::partial_assignment(assigned, err));
            }
            assigned.push(task.id.clone());
        }

        info!(
            festival = %plan.festival_id,
            count = assigned.len(),
            "plan assigned"
        );
        Ok(assigned)
    }

    async fn assign_task(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        agent_id: &str,
    ) -> Result<()> {
        let payload = TaskAssignmentPayload {
            task_id: task_id.to_string(),
            task_name: String::new(),
            agent_id: agent_id.to_string(),
            dependencies: Vec::new(),
        };
        self.publish_assignment(cancel, payload).await
    }
}
