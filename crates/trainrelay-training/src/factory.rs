//! Metric ingestion: turns an untyped submission into a typed, owned `MetricRecord`.
//!
//! The caller picks the creator (usually from the endpoint that received the payload);
//! the family is never inferred from the payload's shape.

use crate::error::{TrainingError, TrainingResult};
use crate::metrics::{MetricFamily, MetricPayload, MetricRecord, MetricValues, TextValues, ZoneValues};
use crate::run::{RunId, TrainingRun};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Resolves metric owners and existing epochs. Implemented by the storage layer.
pub trait MetricOwnerLookup: Send + Sync {
    fn find_run(&self, run_id: RunId) -> TrainingResult<Option<TrainingRun>>;

    fn epoch_recorded(&self, run_id: RunId, family: MetricFamily, epoch: u32) -> TrainingResult<bool>;
}

/// One concrete creator per metric family.
pub trait MetricCreator {
    type Values: DeserializeOwned;

    fn family(&self) -> MetricFamily;

    fn wrap(&self, values: Self::Values) -> MetricValues;

    /// Decodes the family-specific payload.
    fn decode(&self, payload: serde_json::Value) -> TrainingResult<MetricPayload<Self::Values>> {
        serde_json::from_value(payload).map_err(|e| TrainingError::InvalidPayload {
            family: self.family(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneMetricCreator;

impl MetricCreator for ZoneMetricCreator {
    type Values = ZoneValues;

    fn family(&self) -> MetricFamily {
        MetricFamily::Zone
    }

    fn wrap(&self, values: ZoneValues) -> MetricValues {
        MetricValues::Zone(values)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextMetricCreator;

impl MetricCreator for TextMetricCreator {
    type Values = TextValues;

    fn family(&self) -> MetricFamily {
        MetricFamily::Text
    }

    fn wrap(&self, values: TextValues) -> MetricValues {
        MetricValues::Text(values)
    }
}

/// Builds records against an owner lookup. Nothing is persisted here.
pub struct MetricIngestion<'a, L: MetricOwnerLookup + ?Sized> {
    lookup: &'a L,
}

impl<'a, L: MetricOwnerLookup + ?Sized> MetricIngestion<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Ingest an untyped payload with the creator selected by `family`.
    pub fn ingest(
        &self,
        family: MetricFamily,
        payload: serde_json::Value,
        run_id: RunId,
    ) -> TrainingResult<MetricRecord> {
        match family {
            MetricFamily::Zone => {
                let creator = ZoneMetricCreator;
                let typed = creator.decode(payload)?;
                self.create(&creator, typed, run_id)
            }
            MetricFamily::Text => {
                let creator = TextMetricCreator;
                let typed = creator.decode(payload)?;
                self.create(&creator, typed, run_id)
            }
        }
    }

    fn create<C: MetricCreator>(
        &self,
        creator: &C,
        payload: MetricPayload<C::Values>,
        run_id: RunId,
    ) -> TrainingResult<MetricRecord> {
        let family = creator.family();
        let run = self
            .lookup
            .find_run(run_id)?
            .ok_or(TrainingError::OwnerNotFound(run_id))?;

        if self.lookup.epoch_recorded(run.id, family, payload.epoch)? {
            return Err(TrainingError::DuplicateEpoch {
                run_id: run.id,
                family,
                epoch: payload.epoch,
            });
        }

        debug!(run_id = %run.id, family = %family, epoch = payload.epoch, "Built metric record");

        Ok(MetricRecord {
            id: None,
            run_id: run.id,
            epoch: payload.epoch,
            created_at: payload.created_at.unwrap_or_else(Utc::now),
            values: creator.wrap(payload.values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunType, UserId};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLookup {
        runs: Vec<TrainingRun>,
        recorded: Mutex<HashSet<(i64, MetricFamily, u32)>>,
    }

    impl FakeLookup {
        fn with_run(id: i64) -> Self {
            Self {
                runs: vec![TrainingRun {
                    id: RunId(id),
                    run_type: RunType::ZoneDetection,
                    name: "corners".to_string(),
                    created_at: Utc::now(),
                    user_id: UserId(7),
                }],
                recorded: Mutex::default(),
            }
        }
    }

    impl MetricOwnerLookup for FakeLookup {
        fn find_run(&self, run_id: RunId) -> TrainingResult<Option<TrainingRun>> {
            Ok(self.runs.iter().find(|r| r.id == run_id).cloned())
        }

        fn epoch_recorded(&self, run_id: RunId, family: MetricFamily, epoch: u32) -> TrainingResult<bool> {
            Ok(self.recorded.lock().unwrap().contains(&(run_id.0, family, epoch)))
        }
    }

    fn zone_json(epoch: u32) -> serde_json::Value {
        json!({
            "epoch": epoch,
            "train_box_loss": 0.05, "train_obj_loss": 0.02, "train_cls_loss": 0.01,
            "val_box_loss": 0.06, "val_obj_loss": 0.03, "val_cls_loss": 0.01,
            "precision": 0.91, "recall": 0.85
        })
    }

    #[test]
    fn test_ingest_zone_attaches_owner_and_epoch() {
        let lookup = FakeLookup::with_run(42);
        let record = MetricIngestion::new(&lookup)
            .ingest(MetricFamily::Zone, zone_json(5), RunId(42))
            .unwrap();

        assert_eq!(record.run_id, RunId(42));
        assert_eq!(record.epoch, 5);
        assert_eq!(record.family(), MetricFamily::Zone);
        assert_eq!(record.precision(), Some(0.91));
        assert!(record.id.is_none());
    }

    #[test]
    fn test_ingest_unknown_owner_fails() {
        let lookup = FakeLookup::with_run(42);
        let err = MetricIngestion::new(&lookup)
            .ingest(MetricFamily::Zone, zone_json(1), RunId(99))
            .unwrap_err();
        assert!(matches!(err, TrainingError::OwnerNotFound(RunId(99))));
    }

    #[test]
    fn test_ingest_keeps_supplied_timestamp() {
        let lookup = FakeLookup::with_run(1);
        let mut payload = zone_json(2);
        payload["created_at"] = json!("2024-03-01T10:00:00Z");
        let record = MetricIngestion::new(&lookup)
            .ingest(MetricFamily::Zone, payload, RunId(1))
            .unwrap();
        assert_eq!(record.created_at, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_ingest_text_payload_through_zone_creator_is_invalid() {
        let lookup = FakeLookup::with_run(1);
        let text = json!({
            "epoch": 1, "train_loss": 1.0, "val_loss": 1.1, "train_accuracy": 0.5,
            "val_accuracy": 0.4, "character_error_rate": 0.2, "word_error_rate": 0.3
        });
        let err = MetricIngestion::new(&lookup)
            .ingest(MetricFamily::Zone, text.clone(), RunId(1))
            .unwrap_err();
        assert!(matches!(err, TrainingError::InvalidPayload { family: MetricFamily::Zone, .. }));

        let record = MetricIngestion::new(&lookup)
            .ingest(MetricFamily::Text, text, RunId(1))
            .unwrap();
        assert_eq!(record.family(), MetricFamily::Text);
    }

    #[test]
    fn test_ingest_rejects_recorded_epoch() {
        let lookup = FakeLookup::with_run(3);
        lookup
            .recorded
            .lock()
            .unwrap()
            .insert((3, MetricFamily::Zone, 4));

        let err = MetricIngestion::new(&lookup)
            .ingest(MetricFamily::Zone, zone_json(4), RunId(3))
            .unwrap_err();
        assert!(matches!(err, TrainingError::DuplicateEpoch { epoch: 4, .. }));

        // Same epoch in the other family is fine.
        let text = json!({
            "epoch": 4, "train_loss": 1.0, "val_loss": 1.1, "train_accuracy": 0.5,
            "val_accuracy": 0.4, "character_error_rate": 0.2, "word_error_rate": 0.3
        });
        assert!(MetricIngestion::new(&lookup).ingest(MetricFamily::Text, text, RunId(3)).is_ok());
    }
}
