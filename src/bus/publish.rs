use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{MessagePublisher, TopicTransport};
use crate::error::{CoordinatorError, Result};
use crate::ledger::TopicId;
use crate::protocol::Envelope;

/// Retry policy for publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,
    /// Delay before the first retry, doubled per attempt (default: 500ms)
    pub base_backoff_ms: u64,
    /// Cap on any single backoff (default: 5s)
    pub max_backoff_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

impl PublishConfig {
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let delay = self
            .base_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Publisher that retries transient transport failures with exponential backoff.
pub struct RetryingPublisher<T: TopicTransport> {
    transport: Arc<T>,
    config: PublishConfig,
}

impl<T: TopicTransport> RetryingPublisher<T> {
    pub fn new(transport: Arc<T>, config: PublishConfig) -> Self {
        Self { transport, config }
    }

    pub fn with_defaults(transport: Arc<T>) -> Self {
        Self::new(transport, PublishConfig::default())
    }
}

#[async_trait]
impl<T: TopicTransport> MessagePublisher for RetryingPublisher<T> {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        topic: TopicId,
        envelope: &Envelope,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::cancelled(format!("publish to topic {topic}")));
        }

        let data = envelope.to_bytes().map_err(|e| {
            e.context(format!(
                "publish to topic {topic}: marshal type {}",
                envelope.message_type
            ))
        })?;

        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CoordinatorError::cancelled(format!(
                        "publish to topic {topic} attempt {}",
                        attempt + 1
                    )));
                }
                res = self.transport.submit(topic, data.clone()) => res,
            };

            match outcome {
                Ok(()) => {
                    debug!(
                        topic = %topic,
                        msg_type = %envelope.message_type,
                        seq = envelope.sequence_num,
                        "published"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        topic = %topic,
                        attempt = attempt + 1,
                        error = %e,
                        "publish attempt failed"
                    );
                    last_err = Some(e);
                }
            }

            if attempt + 1 < attempts {
                let backoff = self.config.backoff_duration(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(CoordinatorError::cancelled(format!(
                            "publish to topic {topic}: cancelled during backoff"
                        )));
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        let context = format!(
            "publish to topic {topic} type {}: exhausted {attempts} attempts",
            envelope.message_type
        );
        Err(match last_err {
            Some(e) => e.context(context),
            None => CoordinatorError::Publish(context),
        })
    }
}
