//! Error types for Tollgate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures reported by the backing store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The limit-exceeded callback failed after the decision was recorded
    #[error("Limit exceeded callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
