pub mod bus;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod liveness;
pub mod protocol;
pub mod simulation;

pub use bus::{MemoryBus, MessagePublisher, MessageSubscriber, Subscription};
pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use coordinator::{
    Assigner, Engine, Monitor, Payment, PaymentState, Plan, ResultHandler, SettlementOutcome,
    TaskStatus,
};
pub use error::{CoordinatorError, Result};
pub use ledger::{AccountId, MemoryLedger, TokenId, TokenTransfer, TopicId};
