//! Coordination engine
//!
//! Assigns plan tasks to agents over the task topic, folds agent status
//! updates into per-task lifecycle state, and pays each completed task at most
//! once.

pub mod assign;
pub mod config;
pub mod gates;
pub mod monitor;
pub mod payment;
pub mod plan;
pub mod result_handler;
pub mod runtime;
pub mod state;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use assign::Assigner;
pub use config::{AgentBinding, CoordinatorConfig};
pub use gates::{is_quality_gate_task, SimpleGateEnforcer};
pub use monitor::Monitor;
pub use payment::{payment_memo, Payment, SettlementOutcome};
pub use plan::{integration_cycle_plan, Plan, PlanSequence, PlanTask};
pub use result_handler::ResultHandler;
pub use runtime::{Collaborators, Engine, PlanRun};
pub use state::{can_transition, is_terminal, transition, PaymentState, TaskStatus};
pub use traits::{PaymentManager, ProgressMonitor, QualityGate, TaskAssigner};
