use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid entity id '{input}': {reason}")]
    InvalidEntityId { input: String, reason: String },

    // Cancellation
    #[error("{operation}: operation cancelled")]
    Cancelled { operation: String },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("{what} {id}: not tracked")]
    NotTracked { what: &'static str, id: String },

    // Payment errors
    #[error("pay for task {task_id}: already paid")]
    AlreadyPaid { task_id: String },

    #[error("pay for task {task_id}: another payment attempt is in flight")]
    PaymentInFlight { task_id: String },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    // Message bus errors
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{source} ({} task(s) assigned first)", .assigned.len())]
    PartialAssignment {
        assigned: Vec<String>,
        #[source]
        source: Box<CoordinatorError>,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CoordinatorError>,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CoordinatorError {
    /// Cancellation error for `operation`.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Wrap this error with the operation that produced it.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Assignment failure that keeps the ids assigned before it.
    pub fn partial_assignment(assigned: Vec<String>, source: CoordinatorError) -> Self {
        Self::PartialAssignment {
            assigned,
            source: Box::new(source),
        }
    }

    /// Task ids that made it out before a plan assignment failed.
    pub fn assigned_before_failure(&self) -> &[String] {
        match self {
            Self::PartialAssignment { assigned, .. } => assigned,
            Self::Context { source, .. } => source.assigned_before_failure(),
            _ => &[],
        }
    }

    /// Innermost error, skipping any context wrappers.
    pub fn root(&self) -> &CoordinatorError {
        match self {
            Self::Context { source, .. } | Self::PartialAssignment { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled { .. })
    }

    pub fn is_already_paid(&self) -> bool {
        matches!(self.root(), Self::AlreadyPaid { .. })
    }
}

/// Result type alias for CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Extension for attaching operation context to a `Result`.
pub trait ResultExt<T> {
    fn context_with<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CoordinatorError>,
{
    fn context_with<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
