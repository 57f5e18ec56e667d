//! Error types for SPQueue
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;

/// Unified error type for SPQueue operations
#[derive(Debug, Error)]
pub enum QueueError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("Snapshot corruption detected: {0}")]
    SnapshotCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Queue Errors
    // -------------------------------------------------------------------------
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Update in progress, please retry")]
    Busy,

    #[error("Durability failure: {0}")]
    DurabilityFailure(String),

    #[error("Recovery of queue '{queue}' failed: {reason}")]
    RecoveryFailure { queue: String, reason: String },

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Server error: {0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Wrap an error raised while loading persisted state into a RecoveryFailure
    pub fn recovery(queue: &str, reason: impl ToString) -> Self {
        QueueError::RecoveryFailure {
            queue: queue.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the caller may retry the same request later
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            QueueError::Busy
                | QueueError::Unavailable(_)
                | QueueError::DurabilityFailure(_)
                | QueueError::RecoveryFailure { .. }
        )
    }
}

impl From<bincode::Error> for QueueError {
    fn from(e: bincode::Error) -> Self {
        QueueError::Serialization(e.to_string())
    }
}
