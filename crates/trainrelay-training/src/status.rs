use serde::{Deserialize, Serialize};

/// Prefix marking a failure produced by this service rather than reported by the job.
pub const LOCAL_FAILURE_PREFIX: &str = "local failure";

/// Observed state of the remote training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
    /// The job could not be reached; its state is not known.
    Unknown,
}

impl TrainingState {
    /// Maps a tag reported by the job. `started` and `error` are the job's own spellings.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "idle" => Self::Idle,
            "running" | "started" | "training" => Self::Running,
            "completed" | "finished" => Self::Completed,
            "stopped" => Self::Stopped,
            "failed" | "error" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for TrainingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a status value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// Reported by the job (reply body or event stream).
    Remote,
    /// Produced here because the job could not be reached or the request was rejected.
    Local,
}

/// Transient status value. Produced fresh per query or event, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub status: TrainingState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_epoch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_epochs: Option<u32>,
    pub source: StatusSource,
}

impl TrainingStatus {
    #[must_use]
    pub fn idle() -> Self {
        Self::remote(TrainingState::Idle, "idle")
    }

    pub fn remote(status: TrainingState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            current_epoch: None,
            total_epochs: None,
            source: StatusSource::Remote,
        }
    }

    /// A start/stop that never got an answer from the job.
    pub fn local_failure(action: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            status: TrainingState::Failed,
            message: format!("{LOCAL_FAILURE_PREFIX}: {action}: {reason}"),
            current_epoch: None,
            total_epochs: None,
            source: StatusSource::Local,
        }
    }

    /// A status poll that never got an answer from the job.
    pub fn unreachable(reason: impl std::fmt::Display) -> Self {
        Self {
            status: TrainingState::Unknown,
            message: format!("training job unreachable: {reason}"),
            current_epoch: None,
            total_epochs: None,
            source: StatusSource::Local,
        }
    }

    #[must_use]
    pub fn with_epochs(mut self, current: Option<u32>, total: Option<u32>) -> Self {
        self.current_epoch = current;
        self.total_epochs = total;
        self
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.source == StatusSource::Local
    }
}

/// Status document as the job sends it. Older job builds answer `{is_training, ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusDocument {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "currentEpoch")]
    pub current_epoch: Option<u32>,
    #[serde(default, alias = "total_epoch", alias = "totalEpochs")]
    pub total_epochs: Option<u32>,
    #[serde(default)]
    pub is_training: Option<bool>,
}

impl StatusDocument {
    /// Converts to a status, or `None` if the document carries neither `status` nor `is_training`.
    #[must_use]
    pub fn into_status(self) -> Option<TrainingStatus> {
        let state = match (self.status.as_deref(), self.is_training) {
            (Some(tag), _) => TrainingState::from_tag(tag),
            (None, Some(true)) => TrainingState::Running,
            (None, Some(false)) => TrainingState::Idle,
            (None, None) => return None,
        };
        let message = self.message.unwrap_or_else(|| state.as_str().to_string());
        Some(TrainingStatus::remote(state, message).with_epochs(self.current_epoch, self.total_epochs))
    }
}
