use thiserror::Error;
use trainrelay_training::TrainingError;

use crate::storage::StorageError;

/// Errors surfaced by the metrics store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Rejected before anything was persisted.
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] TrainingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
