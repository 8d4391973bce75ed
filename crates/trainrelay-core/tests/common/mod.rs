//! Shared test utilities for TrainRelay Core integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use trainrelay_core::config::{DeploymentConfig, UpstreamConfig};
use trainrelay_core::{
    AppState, ControlClient, Database, EventHub, MetricsStore, SessionState, SqliteTrainingStore,
    TrainingEventRelay, WebSocketConnector,
};
use trainrelay_training::ArtifactLayout;

/// Address nothing listens on.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

pub fn zone_payload(epoch: u32, precision: f64, recall: f64) -> Value {
    json!({
        "epoch": epoch,
        "train_box_loss": 0.05,
        "train_obj_loss": 0.02,
        "train_cls_loss": 0.01,
        "val_box_loss": 0.06,
        "val_obj_loss": 0.03,
        "val_cls_loss": 0.015,
        "precision": precision,
        "recall": recall,
    })
}

pub fn text_payload(epoch: u32, cer: f64) -> Value {
    json!({
        "epoch": epoch,
        "train_loss": 0.4,
        "val_loss": 0.5,
        "train_accuracy": 0.9,
        "val_accuracy": 0.88,
        "character_error_rate": cer,
        "word_error_rate": cer * 2.0,
    })
}

/// Metrics store over an in-memory database with artifacts under `artifacts`.
pub fn memory_store(artifacts: &Path) -> MetricsStore {
    let db = Database::open_in_memory().expect("in-memory database");
    MetricsStore::new(SqliteTrainingStore::new(db), ArtifactLayout::new(artifacts, "weights/best.pt"))
}

/// Full application state talking to `base_url`, with a relay pointed at nothing.
pub fn app_state(base_url: &str, artifacts: &Path) -> AppState {
    app_state_with_store(base_url, memory_store(artifacts))
}

/// Like `app_state`, over a database the test keeps a handle to.
pub fn app_state_with_db(base_url: &str, artifacts: &Path, db: Arc<Mutex<Database>>) -> AppState {
    let store = MetricsStore::new(SqliteTrainingStore::shared(db), ArtifactLayout::new(artifacts, "weights/best.pt"));
    app_state_with_store(base_url, store)
}

fn app_state_with_store(base_url: &str, store: MetricsStore) -> AppState {
    let session = Arc::new(SessionState::new());
    let upstream = UpstreamConfig {
        base_url: base_url.to_string(),
        request_timeout_secs: 2,
        ..UpstreamConfig::default()
    };
    let control = ControlClient::new(&upstream, DeploymentConfig::default(), Arc::clone(&session))
        .expect("http client");
    let connector = WebSocketConnector::new("ws://127.0.0.1:1/ws/training", Duration::from_secs(1));
    let relay = TrainingEventRelay::new(Arc::new(connector), Arc::clone(&session), EventHub::new(16));
    AppState::new(control, store, relay, session)
}
