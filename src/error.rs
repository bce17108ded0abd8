use thiserror::Error;

/// Main error type for the execution service
#[derive(Error, Debug)]
pub enum ExecutionError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Storage-level failures outside the driver (pool exhaustion, injected
    // outages in tests). Callers treat these like Database: abort the unit
    // without acknowledging.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    // Broker errors
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // Inbound payload failed schema validation; dead-lettered and acked
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ExecutionError {
    /// Whether the processing unit should be retried (event left unacked).
    /// Malformed payloads are the exception: they are dead-lettered and
    /// acknowledged so a poison message cannot loop forever.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecutionError::MalformedEvent(_))
    }
}

/// Result type alias for ExecutionError
pub type Result<T> = std::result::Result<T, ExecutionError>;
