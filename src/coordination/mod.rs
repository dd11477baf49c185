//! Process-level coordination: shutdown sequencing around the run's
//! cancellation token.

pub mod shutdown;

pub use shutdown::{
    install_signal_handlers, GracefulShutdown, ShutdownConfig, ShutdownError, ShutdownPhase,
    ShutdownSignal,
};
