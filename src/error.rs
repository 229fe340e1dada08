//! Error types for loyalty-core.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in loyalty-core.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Subscription store read or write failed.
    #[error("subscription store error: {0}")]
    Store(String),

    /// Notification delivery failed.
    #[error("notification error: {0}")]
    Notification(String),

    /// Snapshot or summary (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
