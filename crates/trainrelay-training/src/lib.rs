//! TrainRelay Training
//!
//! Backend-agnostic primitives for observing an external training job:
//! - Training runs and their parameter snapshots (`TrainingRun`, `TrainingParams`)
//! - Per-epoch metric records for zone detection and text recognition (`MetricRecord`)
//! - Ingestion of untyped metric submissions (`MetricIngestion`)
//! - The job's status model (`TrainingStatus`) and event stream (`UpstreamEvent`)
//! - Artifact locations on disk (`ArtifactLayout`)

pub mod error;
pub mod events;
pub mod factory;
pub mod layout;
pub mod metrics;
pub mod run;
pub mod status;

pub use error::{TrainingError, TrainingResult};
pub use events::{RelayEvent, StatusUpdate, Topic, UpstreamEvent, ValidationResult};
pub use factory::{MetricCreator, MetricIngestion, MetricOwnerLookup, TextMetricCreator, ZoneMetricCreator};
pub use layout::ArtifactLayout;
pub use metrics::{
    MetricFamily, MetricId, MetricPayload, MetricRecord, MetricValues, TextPayload, TextValues, ZonePayload,
    ZoneValues,
};
pub use run::{RunId, RunType, TrainingParams, TrainingRun, UserId};
pub use status::{StatusDocument, StatusSource, TrainingState, TrainingStatus, LOCAL_FAILURE_PREFIX};
