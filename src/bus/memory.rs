//! In-process topic transport.
//!
//! Each topic is an append-only log. Opening a stream replays the full history
//! and then follows live appends, so a subscriber that (re)connects late still
//! sees every message, at the cost of duplicates after a reconnect.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use super::{
    MessagePublisher, MessageSubscriber, PublishConfig, RawStream, ReconnectingSubscriber,
    RetryingPublisher, SubscribeConfig, Subscription, TopicTransport,
};
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::Envelope;

const DEFAULT_LIVE_CAPACITY: usize = 1024;

struct TopicLog {
    history: Vec<Vec<u8>>,
    live: broadcast::Sender<Vec<u8>>,
}

impl TopicLog {
    fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity);
        Self {
            history: Vec::new(),
            live,
        }
    }
}

/// Topic transport backed by in-memory logs.
pub struct MemoryTransport {
    topics: Mutex<HashMap<TopicId, TopicLog>>,
    live_capacity: usize,
    failing_submits: AtomicU32,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            live_capacity: DEFAULT_LIVE_CAPACITY,
            failing_submits: AtomicU32::new(0),
        }
    }

    /// Make the next `count` submits fail with a transport error.
    pub fn fail_next_submits(&self, count: u32) {
        self.failing_submits.store(count, Ordering::SeqCst);
    }

    /// Every envelope appended to `topic` so far, in log order.
    pub async fn envelopes(&self, topic: TopicId) -> Vec<Envelope> {
        let topics = self.topics.lock().await;
        topics
            .get(&topic)
            .map(|log| {
                log.history
                    .iter()
                    .filter_map(|data| Envelope::from_bytes(data).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TopicTransport for MemoryTransport {
    async fn submit(&self, topic: TopicId, data: Vec<u8>) -> Result<()> {
        if self.take_injected_failure() {
            return Err(CoordinatorError::Transport(format!(
                "submit to topic {topic}: injected failure"
            )));
        }

        let mut topics = self.topics.lock().await;
        let log = topics
            .entry(topic)
            .or_insert_with(|| TopicLog::new(self.live_capacity));
        log.history.push(data.clone());
        // no live receivers is fine; history covers late subscribers
        let _ = log.live.send(data);
        Ok(())
    }

    async fn open(&self, topic: TopicId) -> Result<RawStream> {
        let (history, rx) = {
            let mut topics = self.topics.lock().await;
            let log = topics
                .entry(topic)
                .or_insert_with(|| TopicLog::new(self.live_capacity));
            (log.history.clone(), log.live.subscribe())
        };

        let replay = stream::iter(history.into_iter().map(Ok));
        let live = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(data) => Some((Ok(data), rx)),
                Err(broadcast::error::RecvError::Lagged(missed)) => Some((
                    Err(CoordinatorError::Transport(format!(
                        "subscriber lagged behind by {missed} messages"
                    ))),
                    rx,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });

        Ok(replay.chain(live).boxed())
    }
}

/// Publisher and subscriber pair over one shared [`MemoryTransport`].
pub struct MemoryBus {
    transport: Arc<MemoryTransport>,
    publisher: RetryingPublisher<MemoryTransport>,
    subscriber: ReconnectingSubscriber<MemoryTransport>,
}

impl MemoryBus {
    pub fn new(publish: PublishConfig, subscribe: SubscribeConfig) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        Self {
            publisher: RetryingPublisher::new(transport.clone(), publish),
            subscriber: ReconnectingSubscriber::new(transport.clone(), subscribe),
            transport,
        }
    }

    /// Bus with near-zero retry delays, for tests and local simulation.
    pub fn fast() -> Self {
        Self::new(
            PublishConfig {
                max_retries: 3,
                base_backoff_ms: 1,
                max_backoff_ms: 10,
            },
            SubscribeConfig {
                message_buffer: 256,
                reconnect_delay_ms: 10,
                max_reconnects: 10,
            },
        )
    }

    pub fn transport(&self) -> &Arc<MemoryTransport> {
        &self.transport
    }
}

#[async_trait]
impl MessagePublisher for MemoryBus {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        topic: TopicId,
        envelope: &Envelope,
    ) -> Result<()> {
        self.publisher.publish(cancel, topic, envelope).await
    }
}

impl MessageSubscriber for MemoryBus {
    fn subscribe(&self, cancel: &CancellationToken, topic: TopicId) -> Subscription {
        self.subscriber.subscribe(cancel, topic)
    }
}
