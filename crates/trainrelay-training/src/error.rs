use crate::metrics::MetricFamily;
use crate::run::RunId;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training params: {0}")]
    InvalidParams(String),

    #[error("invalid {family} metric payload: {reason}")]
    InvalidPayload { family: MetricFamily, reason: String },

    #[error("owner not found: training run {0}")]
    OwnerNotFound(RunId),

    #[error("unsupported metric family: {0}")]
    UnsupportedMetricFamily(String),

    #[error("{family} metric for epoch {epoch} already recorded on training run {run_id}")]
    DuplicateEpoch { run_id: RunId, family: MetricFamily, epoch: u32 },

    #[error("owner lookup failed: {0}")]
    Lookup(String),
}
