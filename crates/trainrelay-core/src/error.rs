//! Error types for TrainRelay Core.

use crate::storage::StorageError;
use thiserror::Error;

/// Core error type for service startup and wiring.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for TrainRelay operations.
pub type Result<T> = std::result::Result<T, CoreError>;
