//! In-memory bus doubles shared by the engine's unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{MessagePublisher, MessageSubscriber, Subscription};
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::Envelope;

/// Records every published envelope. Optionally starts failing after a number
/// of successful publishes.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(TopicId, Envelope)>>,
    succeed_limit: Mutex<Option<usize>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// First `successes` publishes succeed, the rest fail.
    pub fn failing_after(successes: usize) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            succeed_limit: Mutex::new(Some(successes)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        let recorded = self.published.lock().unwrap().len();
        *self.succeed_limit.lock().unwrap() = failing.then_some(recorded);
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, env)| env.clone())
            .collect()
    }

    pub fn topics(&self) -> Vec<TopicId> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _)| *topic)
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        topic: TopicId,
        envelope: &Envelope,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(format!("publish to topic {topic}")));
        }
        let mut published = self.published.lock().unwrap();
        if let Some(limit) = *self.succeed_limit.lock().unwrap() {
            if published.len() >= limit {
                return Err(CoordinatorError::Publish(format!(
                    "publish to topic {topic}: exhausted 4 attempts"
                )));
            }
        }
        published.push((topic, envelope.clone()));
        Ok(())
    }
}

/// Subscriber fed by the test through channel senders.
pub struct ChannelSubscriber {
    pending: Mutex<Option<Subscription>>,
}

impl ChannelSubscriber {
    pub fn new() -> (
        Self,
        mpsc::Sender<Envelope>,
        mpsc::Sender<CoordinatorError>,
    ) {
        let (msg_tx, messages) = mpsc::channel(64);
        let (err_tx, errors) = mpsc::channel(64);
        let subscriber = Self {
            pending: Mutex::new(Some(Subscription { messages, errors })),
        };
        (subscriber, msg_tx, err_tx)
    }
}

impl MessageSubscriber for ChannelSubscriber {
    /// Hands out the fed subscription once; later calls get closed streams.
    fn subscribe(&self, _cancel: &CancellationToken, _topic: TopicId) -> Subscription {
        self.pending.lock().unwrap().take().unwrap_or_else(|| {
            let (_, messages) = mpsc::channel(1);
            let (_, errors) = mpsc::channel(1);
            Subscription { messages, errors }
        })
    }
}
