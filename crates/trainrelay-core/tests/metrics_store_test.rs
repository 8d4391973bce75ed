//! Integration tests for metric ingestion and queries through the metrics store.
//!
//! Covers:
//! - Ingestion attaching the owning run and the submitted epoch
//! - Rejection of unknown owners and duplicate epochs with nothing persisted
//! - One stored record when several threads submit the same epoch at once
//! - Top-N ranking per user across runs
//! - Run deletion cascading to metrics and params
//! - Artifact opening

mod common;

use std::sync::Barrier;

use common::{memory_store, text_payload, zone_payload};
use tempfile::TempDir;
use trainrelay_core::StoreError;
use trainrelay_training::{MetricFamily, RunId, RunType, TrainingError, TrainingParams, UserId};

#[test]
fn test_zone_metric_for_epoch_5_on_run_42() {
    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());

    // Ids are assigned sequentially; create runs until one with id 42 exists.
    let mut run = store.create_run(UserId(1), RunType::ZoneDetection, "run").unwrap();
    while run.id != RunId(42) {
        run = store.create_run(UserId(1), RunType::ZoneDetection, "run").unwrap();
    }

    let record = store.submit(MetricFamily::Zone, zone_payload(5, 0.91, 0.85), RunId(42)).unwrap();

    assert!(record.id.is_some());
    assert_eq!(record.epoch, 5);
    assert_eq!(record.run_id, RunId(42));
    assert_eq!(record.precision(), Some(0.91));

    let stored = store.by_run(RunId(42), MetricFamily::Zone).unwrap();
    assert_eq!(stored, vec![record]);
}

#[test]
fn test_unknown_owner_persists_nothing() {
    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());

    let result = store.submit(MetricFamily::Text, text_payload(1, 0.1), RunId(404));
    assert!(matches!(result, Err(StoreError::Ingestion(TrainingError::OwnerNotFound(RunId(404))))));
    assert!(matches!(store.latest(MetricFamily::Text), Err(StoreError::RecordNotFound(_))));
}

#[test]
fn test_duplicate_epoch_is_rejected_per_family() {
    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());
    let run = store.create_run(UserId(3), RunType::TextRecognition, "ocr").unwrap();

    store.submit(MetricFamily::Text, text_payload(1, 0.2), run.id).unwrap();
    let duplicate = store.submit(MetricFamily::Text, text_payload(1, 0.1), run.id);
    assert!(matches!(duplicate, Err(StoreError::Ingestion(TrainingError::DuplicateEpoch { epoch: 1, .. }))));

    // The same epoch in the other family is a different timeline.
    store.submit(MetricFamily::Zone, zone_payload(1, 0.5, 0.5), run.id).unwrap();
    assert_eq!(store.by_run(run.id, MetricFamily::Text).unwrap().len(), 1);
}

#[test]
fn test_concurrent_submissions_of_one_epoch_store_one_record() {
    const SUBMITTERS: usize = 8;

    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());
    let run = store.create_run(UserId(5), RunType::ZoneDetection, "race").unwrap();
    let barrier = Barrier::new(SUBMITTERS);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..SUBMITTERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    store.submit(MetricFamily::Zone, zone_payload(5, 0.8, 0.7), run.id)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StoreError::Ingestion(TrainingError::DuplicateEpoch { epoch: 5, .. })))
    );
    assert_eq!(store.by_run(run.id, MetricFamily::Zone).unwrap().len(), 1);
}

#[test]
fn test_top_5_for_user_7_with_three_records() {
    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());

    let first = store.create_run(UserId(7), RunType::ZoneDetection, "first").unwrap();
    let second = store.create_run(UserId(7), RunType::ZoneDetection, "second").unwrap();
    let other = store.create_run(UserId(8), RunType::ZoneDetection, "other").unwrap();

    store.submit(MetricFamily::Zone, zone_payload(1, 0.62, 0.5), first.id).unwrap();
    store.submit(MetricFamily::Zone, zone_payload(2, 0.88, 0.7), first.id).unwrap();
    store.submit(MetricFamily::Zone, zone_payload(1, 0.75, 0.6), second.id).unwrap();
    store.submit(MetricFamily::Zone, zone_payload(1, 0.99, 0.9), other.id).unwrap();
    store.submit(MetricFamily::Text, text_payload(1, 0.05), second.id).unwrap();

    let top = store.top_n(UserId(7), 5).unwrap();
    let precisions: Vec<f64> = top.iter().filter_map(|r| r.precision()).collect();
    assert_eq!(precisions, vec![0.88, 0.75, 0.62]);
    assert!(top.iter().all(|r| r.run_id != other.id));

    assert!(store.top_n(UserId(7), 0).unwrap().is_empty());
    assert_eq!(store.top_n(UserId(7), 2).unwrap().len(), 2);
    assert!(store.top_n(UserId(99), 5).unwrap().is_empty());
}

#[test]
fn test_latest_returns_most_recent_record() {
    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());
    let run = store.create_run(UserId(1), RunType::ZoneDetection, "run").unwrap();

    let mut early = zone_payload(1, 0.4, 0.4);
    early["created_at"] = "2026-01-01T00:00:00Z".into();
    let mut late = zone_payload(2, 0.5, 0.5);
    late["created_at"] = "2026-01-02T00:00:00Z".into();

    store.submit(MetricFamily::Zone, late, run.id).unwrap();
    store.submit(MetricFamily::Zone, early, run.id).unwrap();

    assert_eq!(store.latest(MetricFamily::Zone).unwrap().epoch, 2);
}

#[test]
fn test_delete_run_cascades() {
    let temp = TempDir::new().unwrap();
    let store = memory_store(temp.path());
    let run = store.create_run(UserId(2), RunType::ZoneDetection, "doomed").unwrap();
    store.save_params(run.id, &TrainingParams::default()).unwrap();
    store.submit(MetricFamily::Zone, zone_payload(1, 0.5, 0.5), run.id).unwrap();

    store.delete_run(run.id).unwrap();

    assert!(matches!(store.get_run(run.id), Err(StoreError::RecordNotFound(_))));
    assert!(matches!(store.latest(MetricFamily::Zone), Err(StoreError::RecordNotFound(_))));
    assert!(matches!(store.delete_run(run.id), Err(StoreError::RecordNotFound(_))));
}

#[tokio::test]
async fn test_open_artifacts() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("weights")).unwrap();
    std::fs::write(temp.path().join("weights/best.pt"), b"weights").unwrap();
    std::fs::write(temp.path().join("results.png"), b"png").unwrap();
    let store = memory_store(temp.path());

    assert_eq!(store.open_model().await.unwrap().len, 7);
    assert_eq!(store.open_image("results.png").await.unwrap().len, 3);
    assert!(matches!(store.open_image("../secrets").await, Err(StoreError::ArtifactMissing(_))));
    assert!(matches!(store.open_image("confusion_matrix.png").await, Err(StoreError::ArtifactMissing(_))));
}
