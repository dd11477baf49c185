use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ids::{AccountId, TokenId};
use crate::error::Result;

/// A token transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub token_id: TokenId,
    pub from_account: AccountId,
    pub to_account: AccountId,
    /// Whole token units; must be positive.
    pub amount: i64,
    pub memo: String,
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_id: String,
    pub token_id: TokenId,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
    /// Terminal status string reported by the ledger (e.g. `SUCCESS`).
    pub status: String,
}

/// Moves payment tokens between ledger accounts.
///
/// Implementations must be atomic: a failed transfer leaves no partial debit or
/// credit behind. They must also be safe for concurrent use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenTransfer: Send + Sync {
    /// Transfer `request.amount` of `request.token_id`. Fails for non-positive amounts.
    async fn transfer(
        &self,
        cancel: &CancellationToken,
        request: TransferRequest,
    ) -> Result<TransferReceipt>;

    /// Associate `token_id` with `account` so it can receive transfers.
    async fn associate_token(
        &self,
        cancel: &CancellationToken,
        token_id: TokenId,
        account: AccountId,
    ) -> Result<()>;
}
