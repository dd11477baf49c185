//! In-process token ledger used for local runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ids::{AccountId, TokenId};
use super::transfer::{TokenTransfer, TransferReceipt, TransferRequest};
use crate::error::{CoordinatorError, Result};

pub const STATUS_SUCCESS: &str = "SUCCESS";

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<(TokenId, AccountId), i64>,
    associations: HashSet<(TokenId, AccountId)>,
    receipts: Vec<TransferReceipt>,
}

/// Token ledger held entirely in memory.
///
/// Mirrors the ledger rules the coordinator depends on: recipients must be
/// associated with the token, the source must hold enough balance, and a transfer
/// either fully applies or does not apply at all.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `token_id` with `supply` units held by `treasury`.
    pub async fn create_token(&self, token_id: TokenId, treasury: AccountId, supply: i64) {
        let mut state = self.state.write().await;
        state.associations.insert((token_id, treasury));
        *state.balances.entry((token_id, treasury)).or_insert(0) += supply;
        debug!(token = %token_id, treasury = %treasury, supply, "token created");
    }

    pub async fn balance(&self, token_id: TokenId, account: AccountId) -> i64 {
        let state = self.state.read().await;
        state
            .balances
            .get(&(token_id, account))
            .copied()
            .unwrap_or(0)
    }

    pub async fn is_associated(&self, token_id: TokenId, account: AccountId) -> bool {
        self.state
            .read()
            .await
            .associations
            .contains(&(token_id, account))
    }

    /// All receipts in execution order.
    pub async fn receipts(&self) -> Vec<TransferReceipt> {
        self.state.read().await.receipts.clone()
    }
}

#[async_trait]
impl TokenTransfer for MemoryLedger {
    async fn transfer(
        &self,
        cancel: &CancellationToken,
        request: TransferRequest,
    ) -> Result<TransferReceipt> {
        let op = format!(
            "transfer token {} from {} to {}",
            request.token_id, request.from_account, request.to_account
        );
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(op));
        }
        if request.amount <= 0 {
            return Err(CoordinatorError::Validation(format!(
                "{op}: amount must be positive, got {}",
                request.amount
            )));
        }

        let mut state = self.state.write().await;

        for account in [request.from_account, request.to_account] {
            if !state.associations.contains(&(request.token_id, account)) {
                return Err(CoordinatorError::Transfer(format!(
                    "{op}: TOKEN_NOT_ASSOCIATED_TO_ACCOUNT ({account})"
                )));
            }
        }

        let source_key = (request.token_id, request.from_account);
        let available = state.balances.get(&source_key).copied().unwrap_or(0);
        if available < request.amount {
            return Err(CoordinatorError::Transfer(format!(
                "{op}: INSUFFICIENT_TOKEN_BALANCE (have {available}, need {})",
                request.amount
            )));
        }

        state.balances.insert(source_key, available - request.amount);
        *state
            .balances
            .entry((request.token_id, request.to_account))
            .or_insert(0) += request.amount;

        let now = Utc::now();
        let receipt = TransferReceipt {
            transaction_id: format!(
                "{}@{}.{:09}",
                request.from_account,
                now.timestamp(),
                now.timestamp_subsec_nanos()
            ),
            token_id: request.token_id,
            from_account: request.from_account,
            to_account: request.to_account,
            amount: request.amount,
            status: STATUS_SUCCESS.to_string(),
        };
        state.receipts.push(receipt.clone());

        debug!(
            tx = %receipt.transaction_id,
            amount = request.amount,
            memo = %request.memo,
            "transfer applied"
        );
        Ok(receipt)
    }

    async fn associate_token(
        &self,
        cancel: &CancellationToken,
        token_id: TokenId,
        account: AccountId,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(format!(
                "associate token {token_id} with account {account}"
            )));
        }
        self.state
            .write()
            .await
            .associations
            .insert((token_id, account));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: TokenId = TokenId::new(0, 0, 500);
    const TREASURY: AccountId = AccountId::new(0, 0, 100);
    const AGENT: AccountId = AccountId::new(0, 0, 200);

    fn request(amount: i64) -> TransferRequest {
        TransferRequest {
            token_id: TOKEN,
            from_account: TREASURY,
            to_account: AGENT,
            amount,
            memo: "payment:task:t-1".into(),
        }
    }

    async fn funded_ledger() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger.create_token(TOKEN, TREASURY, 1_000).await;
        ledger
    }

    #[tokio::test]
    async fn transfer_moves_balance() {
        let ledger = funded_ledger().await;
        let cancel = CancellationToken::new();
        ledger.associate_token(&cancel, TOKEN, AGENT).await.unwrap();

        let receipt = ledger.transfer(&cancel, request(250)).await.unwrap();

        assert_eq!(receipt.status, STATUS_SUCCESS);
        assert_eq!(ledger.balance(TOKEN, TREASURY).await, 750);
        assert_eq!(ledger.balance(TOKEN, AGENT).await, 250);
        assert_eq!(ledger.receipts().await.len(), 1);
    }

    #[tokio::test]
    async fn unassociated_recipient_is_rejected_without_side_effects() {
        let ledger = funded_ledger().await;
        let cancel = CancellationToken::new();

        let err = ledger.transfer(&cancel, request(10)).await.unwrap_err();

        assert!(err.to_string().contains("TOKEN_NOT_ASSOCIATED_TO_ACCOUNT"));
        assert_eq!(ledger.balance(TOKEN, TREASURY).await, 1_000);
        assert!(ledger.receipts().await.is_empty());
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected() {
        let ledger = funded_ledger().await;
        let cancel = CancellationToken::new();
        ledger.associate_token(&cancel, TOKEN, AGENT).await.unwrap();

        let err = ledger.transfer(&cancel, request(5_000)).await.unwrap_err();

        assert!(err.to_string().contains("INSUFFICIENT_TOKEN_BALANCE"));
        assert_eq!(ledger.balance(TOKEN, AGENT).await, 0);
    }

    #[tokio::test]
    async fn non_positive_amount_and_cancellation_fail_fast() {
        let ledger = funded_ledger().await;
        let cancel = CancellationToken::new();
        ledger.associate_token(&cancel, TOKEN, AGENT).await.unwrap();

        assert!(ledger.transfer(&cancel, request(0)).await.is_err());
        assert!(ledger.transfer(&cancel, request(-3)).await.is_err());

        cancel.cancel();
        let err = ledger.transfer(&cancel, request(1)).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(ledger
            .associate_token(&cancel, TOKEN, AccountId::new(0, 0, 9))
            .await
            .is_err());
    }
}
