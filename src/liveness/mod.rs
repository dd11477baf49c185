//! Optional liveness side-channel to an external agent supervisor.
//!
//! The coordinator registers once and then heartbeats on a fixed interval. It
//! never depends on the supervisor: any connection or registration failure
//! falls back to [`NoopLiveness`] and the engine behaves exactly the same.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;

pub use http::HttpLiveness;

/// Connection settings for the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Try to connect at all (default: false)
    pub enabled: bool,
    /// Base URL of the supervisor (default: http://localhost:50051)
    pub address: String,
    /// Connect timeout (default: 10s)
    pub dial_timeout_ms: u64,
    /// Per-request timeout (default: 30s)
    pub call_timeout_ms: u64,
    /// Heartbeat period (default: 30s)
    pub heartbeat_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "http://localhost:50051".to_string(),
            dial_timeout_ms: 10_000,
            call_timeout_ms: 30_000,
            heartbeat_interval_secs: 30,
        }
    }
}

impl LivenessConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.address.trim().is_empty() {
            errors.push("liveness: address is required".to_string());
        }
        if self.dial_timeout_ms == 0 {
            errors.push("liveness: dial timeout must be positive".to_string());
        }
        if self.call_timeout_ms == 0 {
            errors.push("liveness: call timeout must be positive".to_string());
        }
        if self.heartbeat_interval_secs == 0 {
            errors.push("liveness: heartbeat interval must be positive".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub agent_name: String,
    pub agent_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Ledger account the agent transacts from.
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub agent_id: String,
    pub session_id: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Registration and heartbeat against the supervisor.
#[async_trait]
pub trait LivenessClient: Send + Sync {
    async fn register(
        &self,
        cancel: &CancellationToken,
        request: RegisterRequest,
    ) -> Result<RegisterResponse>;

    async fn heartbeat(&self, cancel: &CancellationToken, request: HeartbeatRequest)
        -> Result<()>;
}

/// Liveness client that talks to nobody. Registration always succeeds with a
/// `<name>-standalone` id.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLiveness;

#[async_trait]
impl LivenessClient for NoopLiveness {
    async fn register(
        &self,
        _cancel: &CancellationToken,
        request: RegisterRequest,
    ) -> Result<RegisterResponse> {
        Ok(standalone(request).registration)
    }

    async fn heartbeat(
        &self,
        _cancel: &CancellationToken,
        _request: HeartbeatRequest,
    ) -> Result<()> {
        Ok(())
    }
}

/// A registered session: the client plus the identity it heartbeats as.
pub struct LivenessSession {
    pub client: Arc<dyn LivenessClient>,
    pub registration: RegisterResponse,
}

/// Connect and register, degrading to [`NoopLiveness`] on any failure.
pub async fn connect_liveness(
    cancel: &CancellationToken,
    config: &LivenessConfig,
    request: RegisterRequest,
) -> LivenessSession {
    if !config.enabled {
        debug!("liveness disabled, running standalone");
        return standalone(request);
    }

    let client = match HttpLiveness::new(config.clone()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "liveness connection failed, running standalone");
            return standalone(request);
        }
    };

    match client.register(cancel, request.clone()).await {
        Ok(registration) => {
            info!(
                agent_id = %registration.agent_id,
                session_id = %registration.session_id,
                "registered with supervisor"
            );
            LivenessSession {
                client: Arc::new(client),
                registration,
            }
        }
        Err(e) => {
            warn!(error = %e, "liveness registration failed, running standalone");
            standalone(request)
        }
    }
}

/// Heartbeat every `interval` until cancelled. Failures are logged only.
pub async fn heartbeat_loop(
    cancel: CancellationToken,
    client: Arc<dyn LivenessClient>,
    registration: RegisterResponse,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick fires immediately; registration just happened
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let request = HeartbeatRequest {
                    agent_id: registration.agent_id.clone(),
                    session_id: registration.session_id.clone(),
                    timestamp: Utc::now(),
                };
                if let Err(e) = client.heartbeat(&cancel, request).await {
                    if !e.is_cancelled() {
                        warn!(error = %e, "supervisor heartbeat failed");
                    }
                }
            }
        }
    }
}

fn standalone(request: RegisterRequest) -> LivenessSession {
    LivenessSession {
        client: Arc::new(NoopLiveness),
        registration: RegisterResponse {
            agent_id: format!("{}-standalone", request.agent_name),
            session_id: "noop".to_string(),
            registered_at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> RegisterRequest {
        RegisterRequest {
            agent_name: "coordinator".into(),
            agent_type: "coordinator".into(),
            capabilities: vec!["topics".into(), "payments".into()],
            account_id: "0.0.3001".into(),
        }
    }

    #[tokio::test]
    async fn test_noop_registers_standalone() {
        let response = NoopLiveness
            .register(&CancellationToken::new(), request())
            .await
            .unwrap();
        assert_eq!(response.agent_id, "coordinator-standalone");
        assert_eq!(response.session_id, "noop");
    }

    #[tokio::test]
    async fn test_disabled_liveness_falls_back_to_noop() {
        let session = connect_liveness(
            &CancellationToken::new(),
            &LivenessConfig::default(),
            request(),
        )
        .await;
        assert_eq!(session.registration.agent_id, "coordinator-standalone");
    }

    #[tokio::test]
    async fn test_unreachable_supervisor_falls_back_to_noop() {
        let config = LivenessConfig {
            enabled: true,
            // reserved port on localhost, nothing listens there
            address: "http://127.0.0.1:9".into(),
            dial_timeout_ms: 200,
            call_timeout_ms: 200,
            ..Default::default()
        };
        let session = connect_liveness(&CancellationToken::new(), &config, request()).await;
        assert_eq!(session.registration.agent_id, "coordinator-standalone");
    }

    #[test]
    fn test_config_validation() {
        assert!(LivenessConfig::default().validate().is_ok());
        let bad = LivenessConfig {
            address: " ".into(),
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err().len(), 2);
    }

    struct CountingLiveness {
        beats: AtomicU32,
    }

    #[async_trait]
    impl LivenessClient for CountingLiveness {
        async fn register(
            &self,
            cancel: &CancellationToken,
            request: RegisterRequest,
        ) -> Result<RegisterResponse> {
            NoopLiveness.register(cancel, request).await
        }

        async fn heartbeat(
            &self,
            _cancel: &CancellationToken,
            _request: HeartbeatRequest,
        ) -> Result<()> {
            let n = self.beats.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Err(CoordinatorError::Transport("supervisor busy".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_heartbeat_loop_survives_failures_and_stops_on_cancel() {
        let client = Arc::new(CountingLiveness {
            beats: AtomicU32::new(0),
        });
        let registration = NoopLiveness
            .register(&CancellationToken::new(), request())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(heartbeat_loop(
            cancel.clone(),
            client.clone(),
            registration,
            Duration::from_millis(5),
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("heartbeat loop should stop after cancellation")
            .unwrap();

        assert!(client.beats.load(Ordering::SeqCst) >= 2);
    }
}
