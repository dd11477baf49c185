//! Engine wiring: builds the four components over shared collaborators and
//! runs their loops.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::assign::Assigner;
use super::config::{AgentBinding, CoordinatorConfig};
use super::gates::SimpleGateEnforcer;
use super::monitor::Monitor;
use super::payment::Payment;
use super::plan::Plan;
use super::result_handler::ResultHandler;
use super::state::TaskStatus;
use super::traits::{ProgressMonitor, QualityGate, TaskAssigner};
use crate::bus::{MessagePublisher, MessageSubscriber};
use crate::error::{CoordinatorError, Result};
use crate::ledger::TokenTransfer;

/// External collaborators the engine is built over.
#[derive(Clone)]
pub struct Collaborators {
    pub publisher: Arc<dyn MessagePublisher>,
    pub subscriber: Arc<dyn MessageSubscriber>,
    pub transfer: Arc<dyn TokenTransfer>,
}

/// Outcome of assigning one plan.
#[derive(Debug)]
pub struct PlanRun {
    pub festival_id: String,
    pub assigned: Vec<String>,
    pub total: usize,
}

impl PlanRun {
    pub fn is_complete(&self) -> bool {
        self.assigned.len() == self.total
    }
}

pub struct Engine {
    config: CoordinatorConfig,
    assigner: Arc<Assigner>,
    monitor: Arc<Monitor>,
    payment: Arc<Payment>,
    results: Arc<ResultHandler>,
}

impl Engine {
    /// Build the engine. The quality gate is the reference enforcer when
    /// `quality_gates_enabled`, otherwise none.
    pub fn new(
        config: CoordinatorConfig,
        agents: &[AgentBinding],
        collaborators: Collaborators,
    ) -> Result<Self> {
        let gate: Option<Arc<dyn QualityGate>> = if config.quality_gates_enabled {
            Some(Arc::new(SimpleGateEnforcer::new()))
        } else {
            None
        };
        Self::with_gate(config, agents, collaborators, gate)
    }

    pub fn with_gate(
        config: CoordinatorConfig,
        agents: &[AgentBinding],
        collaborators: Collaborators,
        gate: Option<Arc<dyn QualityGate>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| CoordinatorError::Validation(errors.join("; ")))?;

        let agent_ids: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        let agent_accounts: HashMap<String, String> = agents
            .iter()
            .map(|a| (a.id.clone(), a.account.clone()))
            .collect();

        let Collaborators {
            publisher,
            subscriber,
            transfer,
        } = collaborators;

        let assigner = Arc::new(Assigner::new(
            publisher.clone(),
            config.task_topic,
            agent_ids,
            config.coordinator_id.clone(),
        ));
        let monitor = Arc::new(Monitor::new(
            subscriber.clone(),
            config.status_topic,
            gate,
            config.quality_gate_timeout(),
        ));
        let payment = Arc::new(Payment::new(transfer, publisher, config.clone()));
        let results = Arc::new(ResultHandler::new(
            subscriber,
            config.status_topic,
            payment.clone(),
            agent_accounts,
            config.default_payment_amount,
        ));

        Ok(Self {
            config,
            assigner,
            monitor,
            payment,
            results,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn assigner(&self) -> &Arc<Assigner> {
        &self.assigner
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn payment(&self) -> &Arc<Payment> {
        &self.payment
    }

    pub fn results(&self) -> &Arc<ResultHandler> {
        &self.results
    }

    /// Start the progress monitor and result handler loops. Both return once
    /// `cancel` fires.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let monitor = self.monitor.clone();
        let monitor_cancel = cancel.clone();
        let monitor_task = tokio::spawn(async move {
            if let Err(e) = monitor.start(monitor_cancel).await {
                if !e.is_cancelled() {
                    error!(error = %e, "progress monitor stopped");
                }
            }
        });

        let results = self.results.clone();
        let results_cancel = cancel.clone();
        let results_task = tokio::spawn(async move {
            if let Err(e) = results.start(results_cancel).await {
                if !e.is_cancelled() {
                    error!(error = %e, "result handler stopped");
                }
            }
        });

        vec![monitor_task, results_task]
    }

    /// Seed every task as `pending` and assign the plan.
    ///
    /// A partial assignment is returned as `Ok` with the ids that made it out;
    /// only cancellation or an invalid plan is an error.
    pub async fn run_plan(&self, cancel: &CancellationToken, plan: &Plan) -> Result<PlanRun> {
        plan.validate()?;

        for task in plan.tasks() {
            self.monitor.init_task(&task.id).await;
        }

        let (assigned, err) = match self.assigner.assign_tasks(cancel, plan).await {
            Ok(assigned) => (assigned, None),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => (e.assigned_before_failure().to_vec(), Some(e)),
        };
        let run = PlanRun {
            festival_id: plan.festival_id.clone(),
            assigned,
            total: plan.task_count(),
        };

        if let Some(e) = err {
            warn!(
                festival_id = %run.festival_id,
                assigned = run.assigned.len(),
                total = run.total,
                error = %e,
                "plan partially assigned"
            );
        }

        Ok(run)
    }

    pub async fn task_states(&self) -> HashMap<String, TaskStatus> {
        self.monitor.all_task_states().await
    }
}
