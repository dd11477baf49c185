//! Message bus collaborators.
//!
//! The coordinator only talks to topics through [`MessagePublisher`] and
//! [`MessageSubscriber`]. Both are built on a raw [`TopicTransport`] that moves
//! bytes; retry, backoff, reconnect and envelope decoding live in
//! [`RetryingPublisher`] and [`ReconnectingSubscriber`].

pub mod memory;
pub mod publish;
pub mod subscribe;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::Envelope;

pub use memory::{MemoryBus, MemoryTransport};
pub use publish::{PublishConfig, RetryingPublisher};
pub use subscribe::{ReconnectingSubscriber, SubscribeConfig};

/// Raw message stream for one topic. Ends (or yields `Err`) on transport fault.
pub type RawStream = BoxStream<'static, Result<Vec<u8>>>;

/// Byte-level access to append-only topics.
#[async_trait]
pub trait TopicTransport: Send + Sync + 'static {
    /// Append one message to `topic`.
    async fn submit(&self, topic: TopicId, data: Vec<u8>) -> Result<()>;

    /// Open a stream of every message on `topic`, from the start of the log.
    async fn open(&self, topic: TopicId) -> Result<RawStream>;
}

/// Publishes envelopes to topics.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Serialize and append `envelope` to `topic`. Delivery is at-least-once.
    async fn publish(
        &self,
        cancel: &CancellationToken,
        topic: TopicId,
        envelope: &Envelope,
    ) -> Result<()>;
}

/// Subscribes to topics.
pub trait MessageSubscriber: Send + Sync {
    /// Stream envelopes from `topic` until `cancel` fires or reconnects run out.
    fn subscribe(&self, cancel: &CancellationToken, topic: TopicId) -> Subscription;
}

/// Live subscription: decoded envelopes plus a best-effort error side-channel.
///
/// Both receivers close once the subscription ends for good.
#[derive(Debug)]
pub struct Subscription {
    pub messages: mpsc::Receiver<Envelope>,
    pub errors: mpsc::Receiver<CoordinatorError>,
}
