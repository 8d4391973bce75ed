//! Metrics store: ingestion plus persistence and queries over runs and metrics.

pub mod error;

pub use error::{StoreError, StoreResult};

use std::path::PathBuf;

use tracing::{debug, warn};
use trainrelay_training::{
    ArtifactLayout, MetricFamily, MetricIngestion, MetricRecord, RunId, RunType, TrainingError,
    TrainingParams, TrainingRun, UserId,
};

use crate::storage::{
    MetricRepository, ParamsRepository, RunRepository, SqliteTrainingStore, StorageError,
};

/// An opened artifact ready to be streamed.
#[derive(Debug)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub file: tokio::fs::File,
    pub len: u64,
}

/// Persistence and query surface for runs, params and metric records.
#[derive(Clone)]
pub struct MetricsStore {
    store: SqliteTrainingStore,
    layout: ArtifactLayout,
}

impl MetricsStore {
    pub fn new(store: SqliteTrainingStore, layout: ArtifactLayout) -> Self {
        Self { store, layout }
    }

    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Ingests an untyped payload for `family` and saves it.
    ///
    /// Nothing is written if ingestion fails.
    pub fn submit(
        &self,
        family: MetricFamily,
        payload: serde_json::Value,
        run_id: RunId,
    ) -> StoreResult<MetricRecord> {
        let record = MetricIngestion::new(&self.store).ingest(family, payload, run_id)?;
        self.save(&record)
    }

    /// Saves an already-ingested record, assigning an id.
    ///
    /// Fails with `DuplicateEpoch` if the run gained a record for the same epoch
    /// after ingestion checked it.
    pub fn save(&self, record: &MetricRecord) -> StoreResult<MetricRecord> {
        self.store.metrics.save(record)?.ok_or_else(|| {
            StoreError::Ingestion(TrainingError::DuplicateEpoch {
                run_id: record.run_id,
                family: record.family(),
                epoch: record.epoch,
            })
        })
    }

    /// Most recently created record of a family, from the local database.
    pub fn latest(&self, family: MetricFamily) -> StoreResult<MetricRecord> {
        self.store
            .metrics
            .latest(family)?
            .ok_or_else(|| StoreError::RecordNotFound(format!("no {family} metrics recorded")))
    }

    /// At most `n` zone records across the user's runs, by descending precision.
    pub fn top_n(&self, user_id: UserId, n: usize) -> StoreResult<Vec<MetricRecord>> {
        let records = self.store.metrics.top_by_precision(user_id, n)?;
        debug!(user_id = %user_id, requested = n, returned = records.len(), "Top metrics query");
        Ok(records)
    }

    pub fn by_run(&self, run_id: RunId, family: MetricFamily) -> StoreResult<Vec<MetricRecord>> {
        self.get_run(run_id)?;
        Ok(self.store.metrics.by_run(run_id, family)?)
    }

    // ------------------------------------------------------------------
    // Runs and params
    // ------------------------------------------------------------------

    pub fn create_run(&self, user_id: UserId, run_type: RunType, name: &str) -> StoreResult<TrainingRun> {
        Ok(self.store.runs.create_run(user_id, run_type, name)?)
    }

    pub fn get_run(&self, run_id: RunId) -> StoreResult<TrainingRun> {
        self.store
            .runs
            .get_run(run_id)?
            .ok_or_else(|| StoreError::RecordNotFound(format!("training run {run_id}")))
    }

    pub fn runs_for_user(&self, user_id: UserId) -> StoreResult<Vec<TrainingRun>> {
        Ok(self.store.runs.runs_for_user(user_id)?)
    }

    pub fn delete_run(&self, run_id: RunId) -> StoreResult<()> {
        self.store.runs.delete_run(run_id).map_err(|e| match e {
            StorageError::NotFound(msg) => StoreError::RecordNotFound(msg),
            other => other.into(),
        })
    }

    pub fn save_params(&self, run_id: RunId, params: &TrainingParams) -> StoreResult<()> {
        self.get_run(run_id)?;
        Ok(self.store.params.save_params(run_id, params)?)
    }

    pub fn params_for_run(&self, run_id: RunId) -> StoreResult<TrainingParams> {
        self.store
            .params
            .params_for_run(run_id)?
            .ok_or_else(|| StoreError::RecordNotFound(format!("params for training run {run_id}")))
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Opens the well-known model artifact.
    pub async fn open_model(&self) -> StoreResult<ArtifactFile> {
        open_artifact(self.layout.model_artifact()).await
    }

    /// Opens a named result image under the artifact root.
    pub async fn open_image(&self, name: &str) -> StoreResult<ArtifactFile> {
        let path = self
            .layout
            .image(name)
            .ok_or_else(|| StoreError::ArtifactMissing(format!("invalid artifact name: {name}")))?;
        open_artifact(path).await
    }
}

async fn open_artifact(path: PathBuf) -> StoreResult<ArtifactFile> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::ArtifactMissing(path.display().to_string()));
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to open artifact");
            return Err(StorageError::Io(e).into());
        }
    };
    let metadata = file.metadata().await.map_err(StorageError::Io)?;
    if !metadata.is_file() {
        return Err(StoreError::ArtifactMissing(path.display().to_string()));
    }
    Ok(ArtifactFile { path, file, len: metadata.len() })
}
