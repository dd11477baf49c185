//! Ledger collaborators: entity ids and the token transfer capability.

pub mod ids;
pub mod memory;
pub mod transfer;

pub use ids::{AccountId, EntityId, TokenId, TopicId};
pub use memory::{MemoryLedger, STATUS_SUCCESS};
pub use transfer::{TokenTransfer, TransferReceipt, TransferRequest};

#[cfg(test)]
pub use transfer::MockTokenTransfer;
