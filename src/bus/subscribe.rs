use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{MessageSubscriber, Subscription, TopicTransport};
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::Envelope;

/// Reconnect policy for subscriptions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeConfig {
    /// Capacity of the message and error channels (default: 100)
    pub message_buffer: usize,
    /// Fixed delay between reconnect attempts (default: 2s)
    pub reconnect_delay_ms: u64,
    /// Reconnects allowed before the subscription gives up (default: 10)
    pub max_reconnects: u32,
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            message_buffer: 100,
            reconnect_delay_ms: 2_000,
            max_reconnects: 10,
        }
    }
}

/// Subscriber that transparently reconnects on transport faults.
pub struct ReconnectingSubscriber<T: TopicTransport> {
    transport: Arc<T>,
    config: SubscribeConfig,
}

impl<T: TopicTransport> ReconnectingSubscriber<T> {
    pub fn new(transport: Arc<T>, config: SubscribeConfig) -> Self {
        Self { transport, config }
    }

    pub fn with_defaults(transport: Arc<T>) -> Self {
        Self::new(transport, SubscribeConfig::default())
    }
}

impl<T: TopicTransport> MessageSubscriber for ReconnectingSubscriber<T> {
    fn subscribe(&self, cancel: &CancellationToken, topic: TopicId) -> Subscription {
        let buffer = self.config.message_buffer.max(1);
        let (msg_tx, msg_rx) = mpsc::channel(buffer);
        let (err_tx, err_rx) = mpsc::channel(buffer);

        tokio::spawn(run_subscription(
            self.transport.clone(),
            self.config.clone(),
            cancel.clone(),
            topic,
            msg_tx,
            err_tx,
        ));

        Subscription {
            messages: msg_rx,
            errors: err_rx,
        }
    }
}

/// Best-effort error report; dropped when the error channel is full or unread.
fn report(err_tx: &mpsc::Sender<CoordinatorError>, err: CoordinatorError) {
    if let Err(dropped) = err_tx.try_send(err) {
        debug!(error = %dropped, "subscription error dropped");
    }
}

async fn run_subscription<T: TopicTransport>(
    transport: Arc<T>,
    config: SubscribeConfig,
    cancel: CancellationToken,
    topic: TopicId,
    msg_tx: mpsc::Sender<Envelope>,
    err_tx: mpsc::Sender<CoordinatorError>,
) {
    let attempts = config.max_reconnects.saturating_add(1);
    let delay = Duration::from_millis(config.reconnect_delay_ms);

    for attempt in 0..attempts {
        if cancel.is_cancelled() {
            return;
        }

        let fault = match subscribe_once(&*transport, &cancel, topic, &msg_tx, &err_tx).await {
            Ok(()) => return,
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return;
        }

        warn!(topic = %topic, attempt = attempt + 1, error = %fault, "subscription fault");
        report(
            &err_tx,
            fault.context(format!("subscribe to topic {topic} attempt {}", attempt + 1)),
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    report(
        &err_tx,
        CoordinatorError::Transport(format!(
            "subscribe to topic {topic}: exhausted {attempts} reconnect attempts"
        )),
    );
}

/// Pump one transport session. `Ok` means stop for good (cancelled or consumer
/// gone); `Err` is a fault worth reconnecting over.
async fn subscribe_once<T: TopicTransport>(
    transport: &T,
    cancel: &CancellationToken,
    topic: TopicId,
    msg_tx: &mpsc::Sender<Envelope>,
    err_tx: &mpsc::Sender<CoordinatorError>,
) -> Result<()> {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        opened = transport.open(topic) => opened?,
    };

    let mut seq: u64 = 0;
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            item = stream.next() => item,
        };

        let data = match item {
            None => {
                return Err(CoordinatorError::Transport(
                    "stream closed by transport".to_string(),
                ))
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(data)) => data,
        };
        seq += 1;

        let envelope = match Envelope::from_bytes(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                report(
                    err_tx,
                    e.context(format!("deserialize from topic {topic} message {seq}")),
                );
                continue;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            sent = msg_tx.send(envelope) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
