use crate::error::TrainingError;
use crate::run::{RunId, RunType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The two metric shapes a run can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    /// Region/zone detection: box, object and class losses plus precision/recall.
    Zone,
    /// Text recognition: loss, accuracy and error rates.
    Text,
}

impl MetricFamily {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub const fn run_type(self) -> RunType {
        match self {
            Self::Zone => RunType::ZoneDetection,
            Self::Text => RunType::TextRecognition,
        }
    }
}

impl std::fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricFamily {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zone" | "card-zone" | "zone-detection" => Ok(Self::Zone),
            "text" | "text-recognition" => Ok(Self::Text),
            other => Err(TrainingError::UnsupportedMetricFamily(other.to_string())),
        }
    }
}

/// Generated identifier of a persisted metric record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(pub i64);

impl std::fmt::Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneValues {
    pub train_box_loss: f64,
    pub train_obj_loss: f64,
    pub train_cls_loss: f64,
    pub val_box_loss: f64,
    pub val_obj_loss: f64,
    pub val_cls_loss: f64,
    /// Expected in [0, 1]; not validated.
    #[serde(alias = "metric_precision")]
    pub precision: f64,
    #[serde(alias = "metric_recall")]
    pub recall: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confusion_matrix_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextValues {
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub character_error_rate: f64,
    pub word_error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum MetricValues {
    Zone(ZoneValues),
    Text(TextValues),
}

impl MetricValues {
    #[must_use]
    pub const fn family(&self) -> MetricFamily {
        match self {
            Self::Zone(_) => MetricFamily::Zone,
            Self::Text(_) => MetricFamily::Text,
        }
    }
}

/// One epoch's metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Assigned by the store on save.
    pub id: Option<MetricId>,
    pub run_id: RunId,
    pub epoch: u32,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub values: MetricValues,
}

impl MetricRecord {
    #[must_use]
    pub const fn family(&self) -> MetricFamily {
        self.values.family()
    }

    /// Precision of a zone record; text records have none.
    #[must_use]
    pub fn precision(&self) -> Option<f64> {
        match &self.values {
            MetricValues::Zone(zone) => Some(zone.precision),
            MetricValues::Text(_) => None,
        }
    }
}

/// Incoming metric submission for one family, before the owner is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload<V> {
    pub epoch: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub values: V,
}

pub type ZonePayload = MetricPayload<ZoneValues>;
pub type TextPayload = MetricPayload<TextValues>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parse_accepts_endpoint_aliases() {
        assert_eq!("card-zone".parse::<MetricFamily>().unwrap(), MetricFamily::Zone);
        assert_eq!("text-recognition".parse::<MetricFamily>().unwrap(), MetricFamily::Text);
        match "pose".parse::<MetricFamily>() {
            Err(TrainingError::UnsupportedMetricFamily(tag)) => assert_eq!(tag, "pose"),
            other => panic!("expected UnsupportedMetricFamily, got {other:?}"),
        }
    }

    #[test]
    fn test_zone_payload_reads_job_field_names() {
        let json = r#"{
            "epoch": 5,
            "train_box_loss": 0.05, "train_obj_loss": 0.02, "train_cls_loss": 0.01,
            "val_box_loss": 0.06, "val_obj_loss": 0.03, "val_cls_loss": 0.01,
            "precision": 0.91, "recall": 0.85,
            "results_path": "results.png"
        }"#;
        let payload: ZonePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.epoch, 5);
        assert!(payload.created_at.is_none());
        assert!((payload.values.precision - 0.91).abs() < f64::EPSILON);
        assert_eq!(payload.values.results_path.as_deref(), Some("results.png"));
        assert_eq!(payload.values.confusion_matrix_path, None);
    }

    #[test]
    fn test_record_serializes_family_tag_inline() {
        let record = MetricRecord {
            id: Some(MetricId(3)),
            run_id: RunId(42),
            epoch: 1,
            created_at: Utc::now(),
            values: MetricValues::Text(TextValues {
                train_loss: 1.2,
                val_loss: 1.4,
                train_accuracy: 0.6,
                val_accuracy: 0.55,
                character_error_rate: 0.12,
                word_error_rate: 0.3,
            }),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["family"], "text");
        assert_eq!(value["run_id"], 42);
        assert_eq!(value["word_error_rate"], 0.3);
        assert_eq!(record.precision(), None);
    }
}
