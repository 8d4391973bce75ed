use thiserror::Error;

/// Failures of the upstream event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The connection could not be established.
    #[error("Failed to connect to training event stream: {0}")]
    Connect(String),

    /// The connection failed after it was established.
    #[error("Training event stream transport error: {0}")]
    Transport(String),
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
