//! Result ingestion: records agent results and pays for completed tasks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::payment::SettlementOutcome;
use super::traits::PaymentManager;
use crate::bus::MessageSubscriber;
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::{Envelope, MessageType, PnlReportPayload, TaskResultPayload};

pub struct ResultHandler {
    subscriber: Arc<dyn MessageSubscriber>,
    topic: TopicId,
    payment: Arc<dyn PaymentManager>,
    /// agent id → ledger account that receives its payments
    agent_accounts: HashMap<String, String>,
    payment_amount: i64,
    results: RwLock<HashMap<String, TaskResultPayload>>,
    pnl_reports: RwLock<HashMap<String, PnlReportPayload>>,
}

impl ResultHandler {
    pub fn new(
        subscriber: Arc<dyn MessageSubscriber>,
        topic: TopicId,
        payment: Arc<dyn PaymentManager>,
        agent_accounts: HashMap<String, String>,
        payment_amount: i64,
    ) -> Self {
        Self {
            subscriber,
            topic,
            payment,
            agent_accounts,
            payment_amount,
            results: RwLock::new(HashMap::new()),
            pnl_reports: RwLock::new(HashMap::new()),
        }
    }

    /// Consume the status topic until cancelled or the subscription gives up.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled("result handler start"));
        }

        let mut sub = self.subscriber.subscribe(&cancel, self.topic);
        let mut errors_open = true;
        info!(topic = %self.topic, "result handler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("result handler stopped");
                    return Ok(());
                }
                msg = sub.messages.recv() => match msg {
                    Some(envelope) => self.handle_envelope(&cancel, &envelope).await,
                    None => {
                        warn!(topic = %self.topic, "status subscription closed; result handler exiting");
                        return Ok(());
                    }
                },
                err = sub.errors.recv(), if errors_open => match err {
                    Some(e) => warn!(error = %e, "result handler subscription error"),
                    None => errors_open = false,
                },
            }
        }
    }

    /// Last result seen for `task_id`.
    pub async fn result(&self, task_id: &str) -> Option<TaskResultPayload> {
        self.results.read().await.get(task_id).cloned()
    }

    /// Last PnL report seen from `agent_id`.
    pub async fn pnl_report(&self, agent_id: &str) -> Option<PnlReportPayload> {
        self.pnl_reports.read().await.get(agent_id).cloned()
    }

    pub async fn handle_envelope(&self, cancel: &CancellationToken, envelope: &Envelope) {
        match envelope.message_type {
            MessageType::TaskResult => self.handle_task_result(cancel, envelope).await,
            MessageType::PnlReport => self.handle_pnl_report(envelope).await,
            _ => {}
        }
    }

    async fn handle_task_result(&self, cancel: &CancellationToken, envelope: &Envelope) {
        let result: TaskResultPayload = match envelope.decode_payload() {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "failed to decode task result");
                return;
            }
        };

        info!(
            task_id = %result.task_id,
            status = %result.status,
            sender = %envelope.sender,
            duration_ms = result.duration_ms,
            "task result received"
        );
        let task_id = result.task_id.clone();
        let completed = result.is_completed();
        self.results.write().await.insert(task_id.clone(), result);

        if !completed {
            return;
        }

        let Some(account) = self.agent_accounts.get(&envelope.sender) else {
            warn!(agent_id = %envelope.sender, "no account mapping for agent, skipping payment");
            return;
        };

        let amount = self.payment_amount;
        match self
            .payment
            .pay_for_task(cancel, &task_id, account, amount)
            .await
        {
            Ok(SettlementOutcome::Settled { tx_status }) => info!(
                task_id = %task_id,
                agent_id = %envelope.sender,
                amount,
                tx_status = %tx_status,
                "payment settled"
            ),
            Ok(SettlementOutcome::NotificationFailed { tx_status, error }) => warn!(
                task_id = %task_id,
                agent_id = %envelope.sender,
                amount,
                tx_status = %tx_status,
                error = %error,
                "payment settled without notification"
            ),
            Err(e) if e.is_already_paid() => debug!(
                task_id = %task_id,
                agent_id = %envelope.sender,
                "duplicate completion ignored; task already paid"
            ),
            Err(e) => error!(
                task_id = %task_id,
                agent_id = %envelope.sender,
                amount,
                error = %e,
                "payment failed"
            ),
        }
    }

    async fn handle_pnl_report(&self, envelope: &Envelope) {
        let report: PnlReportPayload = match envelope.decode_payload() {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "failed to decode pnl report");
                return;
            }
        };

        info!(
            sender = %envelope.sender,
            agent_id = %report.agent_id,
            net_pnl = %report.net_pnl,
            trades = report.trade_count,
            self_sustaining = report.is_self_sustaining,
            strategy = %report.active_strategy,
            "pnl report received"
        );
        let key = if report.agent_id.is_empty() {
            envelope.sender.clone()
        } else {
            report.agent_id.clone()
        };
        self.pnl_reports.write().await.insert(key, report);
    }
}
