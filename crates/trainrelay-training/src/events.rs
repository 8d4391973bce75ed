//! Upstream job events and their downstream topics.

use crate::error::TrainingError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Downstream sub-channel an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Status,
    Logs,
    Progress,
    Metrics,
    Validation,
    /// Catch-all for anything the relay does not classify.
    Data,
}

impl Topic {
    pub const ALL: [Self; 6] = [
        Self::Status,
        Self::Logs,
        Self::Progress,
        Self::Metrics,
        Self::Validation,
        Self::Data,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Logs => "logs",
            Self::Progress => "progress",
            Self::Metrics => "metrics",
            Self::Validation => "validation",
            Self::Data => "data",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "logs" | "log" => Ok(Self::Logs),
            "progress" => Ok(Self::Progress),
            "metrics" => Ok(Self::Metrics),
            "validation" => Ok(Self::Validation),
            "data" | "generic" => Ok(Self::Data),
            other => Err(TrainingError::InvalidParams(format!("unknown topic: {other}"))),
        }
    }
}

/// `{status, message}` body of a status-topic event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub message: String,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status: status.into(), message: message.into() }
    }

    #[must_use]
    pub fn connected() -> Self {
        Self::new("connected", "Connected to training event stream")
    }

    #[must_use]
    pub fn disconnected() -> Self {
        Self::new("disconnected", "Disconnected from training event stream")
    }

    pub fn error(description: impl std::fmt::Display) -> Self {
        Self::new("error", format!("Training event stream error: {description}"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawLogBody {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct EpochProgressBody {
    #[serde(alias = "currentEpoch")]
    current_epoch: u32,
    #[serde(alias = "total_epoch", alias = "totalEpochs")]
    total_epochs: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct MetricsBody {
    metrics: BTreeMap<String, f64>,
}

/// Per-class validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "mAP50")]
    pub map50: f64,
    #[serde(rename = "mAP50-95")]
    pub map50_95: f64,
}

/// A decoded message from the job's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    RawLog { content: String, payload: Value },
    EpochProgress { current_epoch: u32, total_epochs: u32 },
    Status(StatusUpdate),
    Metrics(BTreeMap<String, f64>),
    Validation(ValidationResult),
    /// Unknown type, or a known type whose fields did not decode.
    Other { kind: Option<String>, payload: Value },
}

impl UpstreamEvent {
    /// Decodes one text frame. Only non-JSON input is an error.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let payload: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(payload))
    }

    #[must_use]
    pub fn from_value(payload: Value) -> Self {
        let kind = payload.get("type").and_then(Value::as_str).map(str::to_string);
        let decoded = match kind.as_deref() {
            Some("raw_log") => serde_json::from_value::<RawLogBody>(payload.clone())
                .ok()
                .map(|body| Self::RawLog { content: body.content, payload: payload.clone() }),
            Some("epoch_progress") => serde_json::from_value::<EpochProgressBody>(payload.clone())
                .ok()
                .map(|body| Self::EpochProgress {
                    current_epoch: body.current_epoch,
                    total_epochs: body.total_epochs,
                }),
            Some("status") => serde_json::from_value::<StatusBody>(payload.clone())
                .ok()
                .map(|body| {
                    let message = body.message.unwrap_or_default();
                    Self::Status(StatusUpdate::new(body.status, message))
                }),
            Some("metrics") => serde_json::from_value::<MetricsBody>(payload.clone())
                .ok()
                .map(|body| Self::Metrics(body.metrics)),
            Some("validation") => serde_json::from_value::<ValidationResult>(payload.clone())
                .ok()
                .map(Self::Validation),
            _ => None,
        };
        decoded.unwrap_or(Self::Other { kind, payload })
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::RawLog { .. } => Topic::Logs,
            Self::EpochProgress { .. } => Topic::Progress,
            Self::Status(_) => Topic::Status,
            Self::Metrics(_) => Topic::Metrics,
            Self::Validation(_) => Topic::Validation,
            Self::Other { .. } => Topic::Data,
        }
    }

    /// Builds the downstream event. Logs and unknown events keep the full upstream payload.
    #[must_use]
    pub fn to_relay(&self) -> RelayEvent {
        let event = match self {
            Self::RawLog { payload, .. } | Self::Other { payload, .. } => payload.clone(),
            Self::EpochProgress { current_epoch, total_epochs } => json!({
                "type": "epoch_progress",
                "current_epoch": current_epoch,
                "total_epochs": total_epochs,
            }),
            Self::Status(update) => json!(update),
            Self::Metrics(metrics) => json!(metrics),
            Self::Validation(result) => {
                let mut value = json!(result);
                if let Some(map) = value.as_object_mut() {
                    map.insert("type".to_string(), Value::from("validation"));
                }
                value
            }
        };
        RelayEvent { topic: self.topic(), event }
    }
}

/// One event as delivered to downstream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub topic: Topic,
    pub event: Value,
}

impl RelayEvent {
    #[must_use]
    pub fn status(update: &StatusUpdate) -> Self {
        Self { topic: Topic::Status, event: json!(update) }
    }
}
