//! Idempotent payment settlement for completed tasks.
//!
//! A task is paid at most once. The claim on a task is a single atomic map
//! entry operation, so concurrent or replayed completions cannot both reach the
//! ledger. Once a transfer succeeds the task is `processed` forever; failed
//! attempts leave it payable again.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::CoordinatorConfig;
use super::state::PaymentState;
use super::traits::PaymentManager;
use crate::bus::MessagePublisher;
use crate::error::{CoordinatorError, Result};
use crate::ledger::{AccountId, TokenTransfer, TransferRequest};
use crate::protocol::{Envelope, MessageType, PaymentSettledPayload};

/// Memo attached to every payment transfer.
pub fn payment_memo(task_id: &str) -> String {
    format!("payment:task:{task_id}")
}

/// Result of a payment whose transfer went through.
#[derive(Debug)]
pub enum SettlementOutcome {
    /// Transfer succeeded and agents were notified.
    Settled { tx_status: String },
    /// Transfer succeeded but the `payment_settled` notification could not be
    /// published. The payment is final; do not retry it.
    NotificationFailed {
        tx_status: String,
        error: CoordinatorError,
    },
}

impl SettlementOutcome {
    pub fn tx_status(&self) -> &str {
        match self {
            Self::Settled { tx_status } | Self::NotificationFailed { tx_status, .. } => tx_status,
        }
    }

    pub fn is_notified(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Releases an in-flight claim when a pay future is dropped before it resolves.
struct ClaimGuard<'a> {
    payments: &'a DashMap<String, PaymentState>,
    task_id: &'a str,
    armed: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(payments: &'a DashMap<String, PaymentState>, task_id: &'a str) -> Self {
        Self {
            payments,
            task_id,
            armed: true,
        }
    }

    fn resolve(mut self, state: PaymentState) {
        self.payments.insert(self.task_id.to_string(), state);
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Some(mut state) = self.payments.get_mut(self.task_id) {
                if *state == PaymentState::Pending {
                    *state = PaymentState::Failed;
                }
            }
            warn!(task_id = %self.task_id, "payment attempt abandoned; claim released");
        }
    }
}

/// Payment manager backed by a [`TokenTransfer`] and a [`MessagePublisher`].
pub struct Payment {
    transfer: Arc<dyn TokenTransfer>,
    publisher: Arc<dyn MessagePublisher>,
    config: CoordinatorConfig,
    payments: DashMap<String, PaymentState>,
    seq_num: AtomicU64,
}

impl Payment {
    pub fn new(
        transfer: Arc<dyn TokenTransfer>,
        publisher: Arc<dyn MessagePublisher>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            transfer,
            publisher,
            config,
            payments: DashMap::new(),
            seq_num: AtomicU64::new(0),
        }
    }

    /// Claim `task_id` for one payment attempt.
    fn claim(&self, task_id: &str) -> Result<()> {
        match self.payments.entry(task_id.to_string()) {
            Entry::Occupied(mut entry) => match *entry.get() {
                PaymentState::Processed => Err(CoordinatorError::AlreadyPaid {
                    task_id: task_id.to_string(),
                }),
                PaymentState::Pending => Err(CoordinatorError::PaymentInFlight {
                    task_id: task_id.to_string(),
                }),
                PaymentState::Failed => {
                    entry.insert(PaymentState::Pending);
                    Ok(())
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(PaymentState::Pending);
                Ok(())
            }
        }
    }

    async fn publish_settlement(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        agent_id: &str,
        amount: i64,
        tx_status: &str,
    ) -> Result<()> {
        let payload = PaymentSettledPayload {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            amount,
            token_id: self.config.payment_token.to_string(),
            tx_status: tx_status.to_string(),
        };

        let seq = self.seq_num.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = Envelope::new(MessageType::PaymentSettled, &self.config.coordinator_id, seq)
            .with_recipient(agent_id)
            .with_task_id(task_id)
            .with_payload(&payload)
            .map_err(|e| e.context("marshal settlement payload"))?;

        self.publisher
            .publish(cancel, self.config.task_topic, &envelope)
            .await
    }
}

#[async_trait]
impl PaymentManager for Payment {
    async fn pay_for_task(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        agent_id: &str,
        amount: i64,
    ) -> Result<SettlementOutcome> {
        let op = format!("pay for task {task_id} to {agent_id} amount {amount}");

        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(op));
        }
        if amount <= 0 {
            return Err(CoordinatorError::Validation(format!(
                "pay for task {task_id} to {agent_id}: amount must be positive, got {amount}"
            )));
        }

        self.claim(task_id)?;
        let guard = ClaimGuard::new(&self.payments, task_id);

        let to_account = match agent_id.parse::<AccountId>() {
            Ok(account) => account,
            Err(e) => {
                guard.resolve(PaymentState::Failed);
                return Err(e.context(format!("{op}: parse agent account")));
            }
        };

        let request = TransferRequest {
            token_id: self.config.payment_token,
            from_account: self.config.treasury_account,
            to_account,
            amount,
            memo: payment_memo(task_id),
        };

        let receipt = match self.transfer.transfer(cancel, request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                guard.resolve(PaymentState::Failed);
                warn!(task_id, agent_id, amount, error = %e, "payment transfer failed");
                return Err(e.context(format!("{op}: transfer")));
            }
        };
        guard.resolve(PaymentState::Processed);
        info!(
            task_id,
            agent_id,
            amount,
            tx = %receipt.transaction_id,
            status = %receipt.status,
            "payment transferred"
        );

        match self
            .publish_settlement(cancel, task_id, agent_id, amount, &receipt.status)
            .await
        {
            Ok(()) => Ok(SettlementOutcome::Settled {
                tx_status: receipt.status,
            }),
            Err(e) => {
                let error = e.context(format!("{op}: publish settlement"));
                warn!(task_id, error = %error, "payment settled but notification failed");
                Ok(SettlementOutcome::NotificationFailed {
                    tx_status: receipt.status,
                    error,
                })
            }
        }
    }

    async fn payment_status(&self, task_id: &str) -> Result<PaymentState> {
        self.payments
            .get(task_id)
            .map(|state| *state)
            .ok_or_else(|| CoordinatorError::NotTracked {
                what: "payment for task",
                id: task_id.to_string(),
            })
    }
}
