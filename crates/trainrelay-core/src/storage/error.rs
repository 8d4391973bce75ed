//! Error types for the storage layer.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("Database connection error: {0}")]
    Connection(#[from] rusqlite::Error),

    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Data rejected by the store, or a poisoned database lock.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub(crate) fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::InvalidData(format!("Database lock error: {}", e))
}
