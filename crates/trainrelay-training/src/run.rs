use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier for a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for the user owning a run. Users live in an external account service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    ZoneDetection,
    TextRecognition,
}

impl RunType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ZoneDetection => "zone-detection",
            Self::TextRecognition => "text-recognition",
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zone-detection" | "zone" => Ok(Self::ZoneDetection),
            "text-recognition" | "text" => Ok(Self::TextRecognition),
            other => Err(TrainingError::InvalidParams(format!("unknown run type: {other}"))),
        }
    }
}

/// One attempt at training a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub id: RunId,
    pub run_type: RunType,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
}

/// Configuration snapshot for a run. Immutable once the run has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: u32,
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_learning_rate", alias = "learningRate")]
    pub learning_rate: f64,
    #[serde(default, alias = "datasetPath", alias = "dataPath")]
    pub dataset_path: Option<String>,
    #[serde(default, alias = "pretrainedWeightPath", alias = "pretrainedWeights")]
    pub pretrained_weight_path: Option<String>,
}

fn default_batch_size() -> u32 {
    16
}

fn default_epochs() -> u32 {
    3
}

fn default_learning_rate() -> f64 {
    0.01
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            dataset_path: None,
            pretrained_weight_path: None,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidParams("batch_size must be >= 1".to_string()));
        }
        if self.epochs == 0 {
            return Err(TrainingError::InvalidParams("epochs must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidParams("learning_rate must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_are_valid() {
        let params = TrainingParams::default();
        assert_eq!(params.batch_size, 16);
        assert_eq!(params.epochs, 3);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validate_rejects_zero_epochs() {
        let params = TrainingParams { epochs: 0, ..TrainingParams::default() };
        assert!(matches!(params.validate(), Err(TrainingError::InvalidParams(_))));
    }

    #[test]
    fn test_params_validate_rejects_nan_learning_rate() {
        let params = TrainingParams { learning_rate: f64::NAN, ..TrainingParams::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_accept_camel_case_fields() {
        let json = r#"{"batchSize": 8, "epochs": 50, "learningRate": 0.001, "dataPath": "/data/corners"}"#;
        let params: TrainingParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.batch_size, 8);
        assert_eq!(params.epochs, 50);
        assert_eq!(params.dataset_path.as_deref(), Some("/data/corners"));
        assert_eq!(params.pretrained_weight_path, None);
    }

    #[test]
    fn test_run_type_parse() {
        assert_eq!("zone-detection".parse::<RunType>().unwrap(), RunType::ZoneDetection);
        assert_eq!("Text".parse::<RunType>().unwrap(), RunType::TextRecognition);
        assert!("segmentation".parse::<RunType>().is_err());
    }
}
