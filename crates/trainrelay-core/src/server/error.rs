//! HTTP mapping of service errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use trainrelay_training::TrainingError;

use crate::metrics::StoreError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    /// The training job did not answer a pass-through read.
    #[error("training job unavailable: {0}")]
    Upstream(String),
}

impl From<TrainingError> for ApiError {
    fn from(e: TrainingError) -> Self {
        Self::Store(StoreError::Ingestion(e))
    }
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Store(StoreError::RecordNotFound(_) | StoreError::ArtifactMissing(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Ingestion(e)) => match e {
                TrainingError::OwnerNotFound(_) => StatusCode::NOT_FOUND,
                TrainingError::UnsupportedMetricFamily(_) | TrainingError::DuplicateEpoch { .. } => {
                    StatusCode::BAD_REQUEST
                }
                TrainingError::InvalidParams(_) | TrainingError::InvalidPayload { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(StoreError::Storage(e)) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidData(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use trainrelay_training::{MetricFamily, RunId};

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::from(TrainingError::OwnerNotFound(RunId(9))), StatusCode::NOT_FOUND),
            (ApiError::from(TrainingError::UnsupportedMetricFamily("audio".into())), StatusCode::BAD_REQUEST),
            (
                ApiError::from(TrainingError::DuplicateEpoch { run_id: RunId(1), family: MetricFamily::Zone, epoch: 2 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(TrainingError::InvalidPayload { family: MetricFamily::Text, reason: "missing epoch".into() }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::Store(StoreError::RecordNotFound("none".into())), StatusCode::NOT_FOUND),
            (ApiError::Store(StoreError::ArtifactMissing("best.pt".into())), StatusCode::NOT_FOUND),
            (ApiError::Store(StorageError::InvalidData("dup".into()).into()), StatusCode::BAD_REQUEST),
            (ApiError::Store(StorageError::Io(std::io::Error::other("disk full")).into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Upstream("timeout".into()), StatusCode::BAD_GATEWAY),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }
}
