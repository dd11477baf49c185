//! Graceful Shutdown Handler
//!
//! One `CancellationToken` is the run's execution context. Requesting shutdown
//! cancels it, which makes every read loop, publish retry and reconnect wait
//! return; `execute` then gives spawned tasks a bounded window to drain.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Urgent shutdown - skip the drain window
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

/// Configuration for graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for spawned loops to return after cancellation (default: 10s)
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Not shutting down
    Running,
    /// Cancellation fired; loops are returning
    Cancelling,
    /// Waiting for spawned tasks to finish
    Draining,
    /// Shutdown complete
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::Cancelling => write!(f, "cancelling"),
            ShutdownPhase::Draining => write!(f, "draining"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    config: ShutdownConfig,
    cancel: CancellationToken,
    shutdown_requested: AtomicBool,
    urgent: AtomicBool,
    phase: watch::Sender<ShutdownPhase>,
    phase_rx: watch::Receiver<ShutdownPhase>,
    signal_tx: broadcast::Sender<ShutdownSignal>,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase, phase_rx) = watch::channel(ShutdownPhase::Running);
        let (signal_tx, _) = broadcast::channel(8);

        Self {
            config,
            cancel: CancellationToken::new(),
            shutdown_requested: AtomicBool::new(false),
            urgent: AtomicBool::new(false),
            phase,
            phase_rx,
            signal_tx,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ShutdownConfig::default())
    }

    /// Execution context handed to every component of the run.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.signal_tx.subscribe()
    }

    pub fn phase_receiver(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_rx.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_rx.borrow()
    }

    /// Request shutdown and cancel the run's token.
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if signal == ShutdownSignal::Urgent {
            self.urgent.store(true, Ordering::SeqCst);
        }
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.cancel.cancel();
        let _ = self.signal_tx.send(signal);
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        self.cancel.cancelled().await
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        let _ = self.phase.send(phase);
        debug!("Shutdown phase: {}", phase);
    }

    /// Cancel the run (if not already) and wait for `drain` within the drain
    /// window. An urgent request skips the wait.
    pub async fn execute<F>(&self, drain: F) -> Result<(), ShutdownError>
    where
        F: Future<Output = ()>,
    {
        let start = std::time::Instant::now();

        self.set_phase(ShutdownPhase::Cancelling);
        if !self.is_shutdown_requested() {
            self.request_shutdown(ShutdownSignal::Graceful);
        }

        self.set_phase(ShutdownPhase::Draining);
        let result = if self.urgent.load(Ordering::SeqCst) {
            warn!("Urgent shutdown: not waiting for tasks to drain");
            Err(ShutdownError::Interrupted)
        } else {
            let timeout = Duration::from_secs(self.config.drain_timeout_secs);
            match tokio::time::timeout(timeout, drain).await {
                Ok(()) => Ok(()),
                Err(_) => {
                    error!(
                        "Drain timeout after {}s, abandoning remaining tasks",
                        self.config.drain_timeout_secs
                    );
                    Err(ShutdownError::Timeout)
                }
            }
        };

        self.set_phase(ShutdownPhase::Complete);
        info!("Shutdown completed in {:?}", start.elapsed());
        result
    }
}

/// Shutdown errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// Tasks did not drain within the window
    Timeout,
    /// Urgent shutdown skipped draining
    Interrupted,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::Timeout => write!(f, "shutdown timed out"),
            ShutdownError::Interrupted => write!(f, "shutdown interrupted"),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, level) in [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ] {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to install {} handler: {}", name, e);
                        return;
                    }
                };
                // a second signal upgrades to urgent
                while stream.recv().await.is_some() {
                    info!("Received {}", name);
                    if shutdown.is_shutdown_requested() {
                        shutdown.request_shutdown(ShutdownSignal::Urgent);
                    } else {
                        shutdown.request_shutdown(level);
                    }
                }
            });
        }
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                info!("Received Ctrl+C");
                if shutdown.is_shutdown_requested() {
                    shutdown.request_shutdown(ShutdownSignal::Urgent);
                } else {
                    shutdown.request_shutdown(ShutdownSignal::Graceful);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownSignal::Graceful.to_string(), "graceful");
        assert_eq!(ShutdownSignal::Urgent.to_string(), "urgent");
        assert_eq!(ShutdownPhase::Draining.to_string(), "draining");
    }

    #[tokio::test]
    async fn test_request_cancels_token_once() {
        let shutdown = GracefulShutdown::with_defaults();
        let token = shutdown.token();
        let mut signals = shutdown.subscribe();

        assert!(!token.is_cancelled());
        shutdown.request_shutdown(ShutdownSignal::Graceful);
        shutdown.request_shutdown(ShutdownSignal::Graceful);

        assert!(token.is_cancelled());
        assert_eq!(signals.recv().await.unwrap(), ShutdownSignal::Graceful);
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_execute_waits_for_drain() {
        let shutdown = GracefulShutdown::with_defaults();
        let token = shutdown.token();
        let task = tokio::spawn(async move { token.cancelled().await });

        shutdown
            .execute(async {
                let _ = task.await;
            })
            .await
            .unwrap();

        assert_eq!(shutdown.current_phase(), ShutdownPhase::Complete);
    }

    #[tokio::test]
    async fn test_execute_times_out_on_stuck_tasks() {
        let shutdown = GracefulShutdown::new(ShutdownConfig {
            drain_timeout_secs: 0,
        });

        let err = shutdown
            .execute(std::future::pending::<()>())
            .await
            .unwrap_err();

        assert_eq!(err, ShutdownError::Timeout);
    }

    #[tokio::test]
    async fn test_urgent_request_skips_drain() {
        let shutdown = GracefulShutdown::with_defaults();
        shutdown.request_shutdown(ShutdownSignal::Graceful);
        shutdown.request_shutdown(ShutdownSignal::Urgent);

        let err = shutdown
            .execute(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err, ShutdownError::Interrupted);
    }
}
