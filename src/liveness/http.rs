//! JSON-over-HTTP supervisor client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{HeartbeatRequest, LivenessClient, LivenessConfig, RegisterRequest, RegisterResponse};
use crate::error::{CoordinatorError, Result};

const REGISTER_PATH: &str = "/v1/agents/register";
const HEARTBEAT_PATH: &str = "/v1/agents/heartbeat";

/// Supervisor client
#[derive(Clone)]
pub struct HttpLiveness {
    client: Client,
    base_url: String,
}

impl HttpLiveness {
    pub fn new(config: LivenessConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.dial_timeout_ms))
            .timeout(Duration::from_millis(config.call_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.address.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let send = self.client.post(&url).json(body).send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(CoordinatorError::cancelled(format!("POST {url}"))),
            resp = send => resp?,
        };

        if resp.status().is_success() {
            debug!(url = %url, "supervisor call ok");
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(CoordinatorError::Transport(format!(
                "POST {url}: HTTP {status}: {body}"
            )))
        }
    }
}

#[async_trait]
impl LivenessClient for HttpLiveness {
    async fn register(
        &self,
        cancel: &CancellationToken,
        request: RegisterRequest,
    ) -> Result<RegisterResponse> {
        let resp = self.post(cancel, REGISTER_PATH, &request).await?;
        Ok(resp.json::<RegisterResponse>().await?)
    }

    async fn heartbeat(
        &self,
        cancel: &CancellationToken,
        request: HeartbeatRequest,
    ) -> Result<()> {
        self.post(cancel, HEARTBEAT_PATH, &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = HttpLiveness::new(LivenessConfig {
            address: "http://supervisor:8080/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url, "http://supervisor:8080");
    }

    #[tokio::test]
    async fn test_cancelled_call_returns_cancelled() {
        let client = HttpLiveness::new(LivenessConfig {
            // TEST-NET-1, never routable
            address: "http://192.0.2.1:50051".into(),
            ..Default::default()
        })
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .heartbeat(
                &cancel,
                HeartbeatRequest {
                    agent_id: "coordinator".into(),
                    session_id: "s-1".into(),
                    timestamp: chrono::Utc::now(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
