//! Repository implementations for data persistence.
//!
//! Runs, parameter snapshots and metric records, backed by SQLite. Every
//! repository shares one `Database` behind a mutex. Metric inserts check the
//! epoch and write in one transaction; other writes are single statements.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use trainrelay_training::{
    MetricFamily, MetricId, MetricOwnerLookup, MetricRecord, MetricValues, RunId, RunType,
    TextValues, TrainingError, TrainingParams, TrainingResult, TrainingRun, UserId, ZoneValues,
};

use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult, lock_error};

// ============================================================================
// Row Parsing Helpers
// ============================================================================

/// Fixed-width RFC3339 so that `ORDER BY created_at` sorts chronologically.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an RFC3339 timestamp string from a row into a `DateTime<Utc>`.
fn parse_timestamp(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let timestamp_str: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&timestamp_str).map(|dt| dt.with_timezone(&Utc)).map_err(|_| {
        rusqlite::Error::InvalidColumnType(
            idx,
            column_name.to_string(),
            rusqlite::types::Type::Text,
        )
    })
}

fn parse_run_type(row: &Row, idx: usize) -> rusqlite::Result<RunType> {
    let tag: String = row.get(idx)?;
    tag.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, "run_type".to_string(), rusqlite::types::Type::Text)
    })
}

fn run_from_row(row: &Row) -> rusqlite::Result<TrainingRun> {
    Ok(TrainingRun {
        id: RunId(row.get(0)?),
        run_type: parse_run_type(row, 1)?,
        name: row.get(2)?,
        user_id: UserId(row.get(3)?),
        created_at: parse_timestamp(row, 4, "created_at")?,
    })
}

const ZONE_COLUMNS: &str = "z.id, z.run_id, z.epoch, z.created_at, z.train_box_loss, z.train_obj_loss, \
     z.train_cls_loss, z.val_box_loss, z.val_obj_loss, z.val_cls_loss, z.metric_precision, \
     z.metric_recall, z.results_path, z.confusion_matrix_path";

const TEXT_COLUMNS: &str = "t.id, t.run_id, t.epoch, t.created_at, t.train_loss, t.val_loss, \
     t.train_accuracy, t.val_accuracy, t.character_error_rate, t.word_error_rate";

fn zone_from_row(row: &Row) -> rusqlite::Result<MetricRecord> {
    Ok(MetricRecord {
        id: Some(MetricId(row.get(0)?)),
        run_id: RunId(row.get(1)?),
        epoch: row.get(2)?,
        created_at: parse_timestamp(row, 3, "created_at")?,
        values: MetricValues::Zone(ZoneValues {
            train_box_loss: row.get(4)?,
            train_obj_loss: row.get(5)?,
            train_cls_loss: row.get(6)?,
            val_box_loss: row.get(7)?,
            val_obj_loss: row.get(8)?,
            val_cls_loss: row.get(9)?,
            precision: row.get(10)?,
            recall: row.get(11)?,
            results_path: row.get(12)?,
            confusion_matrix_path: row.get(13)?,
        }),
    })
}

fn text_from_row(row: &Row) -> rusqlite::Result<MetricRecord> {
    Ok(MetricRecord {
        id: Some(MetricId(row.get(0)?)),
        run_id: RunId(row.get(1)?),
        epoch: row.get(2)?,
        created_at: parse_timestamp(row, 3, "created_at")?,
        values: MetricValues::Text(TextValues {
            train_loss: row.get(4)?,
            val_loss: row.get(5)?,
            train_accuracy: row.get(6)?,
            val_accuracy: row.get(7)?,
            character_error_rate: row.get(8)?,
            word_error_rate: row.get(9)?,
        }),
    })
}

const fn metric_table(family: MetricFamily) -> &'static str {
    match family {
        MetricFamily::Zone => "zone_metrics",
        MetricFamily::Text => "text_metrics",
    }
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository trait for training runs.
pub trait RunRepository: Send + Sync {
    /// Creates a run owned by `user_id`.
    fn create_run(&self, user_id: UserId, run_type: RunType, name: &str) -> StorageResult<TrainingRun>;

    fn get_run(&self, id: RunId) -> StorageResult<Option<TrainingRun>>;

    /// Runs owned by a user, newest first.
    fn runs_for_user(&self, user_id: UserId) -> StorageResult<Vec<TrainingRun>>;

    /// Deletes a run together with its params and metrics.
    fn delete_run(&self, id: RunId) -> StorageResult<()>;
}

/// Repository trait for parameter snapshots.
pub trait ParamsRepository: Send + Sync {
    /// Stores the snapshot for a run. A run has at most one.
    fn save_params(&self, run_id: RunId, params: &TrainingParams) -> StorageResult<()>;

    fn params_for_run(&self, run_id: RunId) -> StorageResult<Option<TrainingParams>>;
}

/// Repository trait for metric records.
pub trait MetricRepository: Send + Sync {
    /// Inserts a record and returns it with its generated id, or `None` when
    /// the run already has a record of that family for the same epoch.
    ///
    /// The check and the insert run in one transaction under the database lock.
    fn save(&self, record: &MetricRecord) -> StorageResult<Option<MetricRecord>>;

    /// Most recently created record of a family.
    fn latest(&self, family: MetricFamily) -> StorageResult<Option<MetricRecord>>;

    /// Zone records of all runs owned by `user_id`, by descending precision.
    fn top_by_precision(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<MetricRecord>>;

    /// Records of one run and family, by ascending epoch.
    fn by_run(&self, run_id: RunId, family: MetricFamily) -> StorageResult<Vec<MetricRecord>>;

    fn epoch_recorded(&self, run_id: RunId, family: MetricFamily, epoch: u32) -> StorageResult<bool>;
}

// ============================================================================
// SQLite Run Repository
// ============================================================================

/// SQLite implementation of RunRepository.
#[derive(Clone)]
pub struct SqliteRunRepository {
    db: Arc<StdMutex<Database>>,
}

impl SqliteRunRepository {
    pub fn new(db: Arc<StdMutex<Database>>) -> Self {
        Self { db }
    }
}

impl RunRepository for SqliteRunRepository {
    fn create_run(&self, user_id: UserId, run_type: RunType, name: &str) -> StorageResult<TrainingRun> {
        let created_at = Utc::now();
        let db = self.db.lock().map_err(lock_error)?;
        db.conn().execute(
            "INSERT INTO training_runs (run_type, name, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_type.as_str(), name, user_id.0, format_timestamp(&created_at)],
        )?;
        let id = RunId(db.conn().last_insert_rowid());
        info!(run_id = %id, user_id = %user_id, run_type = %run_type, "Created training run");
        Ok(TrainingRun { id, run_type, name: name.to_string(), created_at, user_id })
    }

    fn get_run(&self, id: RunId) -> StorageResult<Option<TrainingRun>> {
        let db = self.db.lock().map_err(lock_error)?;
        let run = db
            .conn()
            .query_row(
                "SELECT id, run_type, name, user_id, created_at FROM training_runs WHERE id = ?1",
                params![id.0],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn runs_for_user(&self, user_id: UserId) -> StorageResult<Vec<TrainingRun>> {
        let db = self.db.lock().map_err(lock_error)?;
        let mut stmt = db.conn().prepare(
            "SELECT id, run_type, name, user_id, created_at FROM training_runs WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let runs = stmt.query_map(params![user_id.0], run_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn delete_run(&self, id: RunId) -> StorageResult<()> {
        let db = self.db.lock().map_err(lock_error)?;
        let deleted = db.conn().execute("DELETE FROM training_runs WHERE id = ?1", params![id.0])?;
        if deleted == 0 {
            return Err(StorageError::NotFound(format!("training run with id {} not found", id)));
        }
        info!(run_id = %id, "Deleted training run");
        Ok(())
    }
}

// ============================================================================
// SQLite Params Repository
// ============================================================================

/// SQLite implementation of ParamsRepository.
#[derive(Clone)]
pub struct SqliteParamsRepository {
    db: Arc<StdMutex<Database>>,
}

impl SqliteParamsRepository {
    pub fn new(db: Arc<StdMutex<Database>>) -> Self {
        Self { db }
    }
}

impl ParamsRepository for SqliteParamsRepository {
    fn save_params(&self, run_id: RunId, params: &TrainingParams) -> StorageResult<()> {
        let db = self.db.lock().map_err(lock_error)?;
        let existing: Option<i64> = db
            .conn()
            .query_row("SELECT id FROM training_params WHERE run_id = ?1", params![run_id.0], |row| {
                row.get(0)
            })
            .optional()?;
        if existing.is_some() {
            return Err(StorageError::InvalidData(format!(
                "training run {} already has a parameter snapshot",
                run_id
            )));
        }

        db.conn().execute(
            "INSERT INTO training_params (run_id, batch_size, epochs, learning_rate, dataset_path, pretrained_weight_path) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id.0,
                params.batch_size,
                params.epochs,
                params.learning_rate,
                params.dataset_path,
                params.pretrained_weight_path
            ],
        )?;
        debug!(run_id = %run_id, "Stored training params");
        Ok(())
    }

    fn params_for_run(&self, run_id: RunId) -> StorageResult<Option<TrainingParams>> {
        let db = self.db.lock().map_err(lock_error)?;
        let params = db
            .conn()
            .query_row(
                "SELECT batch_size, epochs, learning_rate, dataset_path, pretrained_weight_path FROM training_params WHERE run_id = ?1",
                params![run_id.0],
                |row| {
                    Ok(TrainingParams {
                        batch_size: row.get(0)?,
                        epochs: row.get(1)?,
                        learning_rate: row.get(2)?,
                        dataset_path: row.get(3)?,
                        pretrained_weight_path: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(params)
    }
}

// ============================================================================
// SQLite Metric Repository
// ============================================================================

fn epoch_exists(conn: &Connection, run_id: RunId, family: MetricFamily, epoch: u32) -> StorageResult<bool> {
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE run_id = ?1 AND epoch = ?2)", metric_table(family)),
        params![run_id.0, epoch],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn insert_metric(conn: &Connection, record: &MetricRecord) -> StorageResult<()> {
    let created_at = format_timestamp(&record.created_at);
    match &record.values {
        MetricValues::Zone(zone) => {
            conn.execute(
                "INSERT INTO zone_metrics (run_id, epoch, train_box_loss, train_obj_loss, train_cls_loss, val_box_loss, val_obj_loss, val_cls_loss, metric_precision, metric_recall, results_path, confusion_matrix_path, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.run_id.0,
                    record.epoch,
                    zone.train_box_loss,
                    zone.train_obj_loss,
                    zone.train_cls_loss,
                    zone.val_box_loss,
                    zone.val_obj_loss,
                    zone.val_cls_loss,
                    zone.precision,
                    zone.recall,
                    zone.results_path,
                    zone.confusion_matrix_path,
                    created_at
                ],
            )?;
        }
        MetricValues::Text(text) => {
            conn.execute(
                "INSERT INTO text_metrics (run_id, epoch, train_loss, val_loss, train_accuracy, val_accuracy, character_error_rate, word_error_rate, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.run_id.0,
                    record.epoch,
                    text.train_loss,
                    text.val_loss,
                    text.train_accuracy,
                    text.val_accuracy,
                    text.character_error_rate,
                    text.word_error_rate,
                    created_at
                ],
            )?;
        }
    }
    Ok(())
}

/// SQLite implementation of MetricRepository.
#[derive(Clone)]
pub struct SqliteMetricRepository {
    db: Arc<StdMutex<Database>>,
}

impl SqliteMetricRepository {
    pub fn new(db: Arc<StdMutex<Database>>) -> Self {
        Self { db }
    }
}

impl MetricRepository for SqliteMetricRepository {
    fn save(&self, record: &MetricRecord) -> StorageResult<Option<MetricRecord>> {
        let family = record.family();
        let mut db = self.db.lock().map_err(lock_error)?;
        let id = db.transaction(|tx| {
            if epoch_exists(tx, record.run_id, family, record.epoch)? {
                return Ok(None);
            }
            insert_metric(tx, record)?;
            Ok(Some(MetricId(tx.last_insert_rowid())))
        })?;

        let Some(id) = id else {
            debug!(run_id = %record.run_id, family = %family, epoch = record.epoch, "Epoch already recorded");
            return Ok(None);
        };
        info!(
            metric_id = %id,
            run_id = %record.run_id,
            family = %family,
            epoch = record.epoch,
            "Saved metric record"
        );
        Ok(Some(MetricRecord { id: Some(id), ..record.clone() }))
    }

    fn latest(&self, family: MetricFamily) -> StorageResult<Option<MetricRecord>> {
        let db = self.db.lock().map_err(lock_error)?;
        let record = match family {
            MetricFamily::Zone => db
                .conn()
                .query_row(
                    &format!("SELECT {ZONE_COLUMNS} FROM zone_metrics z ORDER BY z.created_at DESC, z.id DESC LIMIT 1"),
                    [],
                    zone_from_row,
                )
                .optional()?,
            MetricFamily::Text => db
                .conn()
                .query_row(
                    &format!("SELECT {TEXT_COLUMNS} FROM text_metrics t ORDER BY t.created_at DESC, t.id DESC LIMIT 1"),
                    [],
                    text_from_row,
                )
                .optional()?,
        };
        Ok(record)
    }

    fn top_by_precision(&self, user_id: UserId, limit: usize) -> StorageResult<Vec<MetricRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let db = self.db.lock().map_err(lock_error)?;
        let mut stmt = db.conn().prepare(&format!(
            "SELECT {ZONE_COLUMNS} FROM zone_metrics z JOIN training_runs r ON r.id = z.run_id WHERE r.user_id = ?1 ORDER BY z.metric_precision DESC LIMIT ?2"
        ))?;
        let records =
            stmt.query_map(params![user_id.0, limit], zone_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn by_run(&self, run_id: RunId, family: MetricFamily) -> StorageResult<Vec<MetricRecord>> {
        let db = self.db.lock().map_err(lock_error)?;
        let records = match family {
            MetricFamily::Zone => {
                let mut stmt = db.conn().prepare(&format!(
                    "SELECT {ZONE_COLUMNS} FROM zone_metrics z WHERE z.run_id = ?1 ORDER BY z.epoch ASC, z.id ASC"
                ))?;
                stmt.query_map(params![run_id.0], zone_from_row)?.collect::<Result<Vec<_>, _>>()?
            }
            MetricFamily::Text => {
                let mut stmt = db.conn().prepare(&format!(
                    "SELECT {TEXT_COLUMNS} FROM text_metrics t WHERE t.run_id = ?1 ORDER BY t.epoch ASC, t.id ASC"
                ))?;
                stmt.query_map(params![run_id.0], text_from_row)?.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    fn epoch_recorded(&self, run_id: RunId, family: MetricFamily, epoch: u32) -> StorageResult<bool> {
        let db = self.db.lock().map_err(lock_error)?;
        epoch_exists(db.conn(), run_id, family, epoch)
    }
}

// ============================================================================
// Combined store
// ============================================================================

/// All three repositories over one shared database.
#[derive(Clone)]
pub struct SqliteTrainingStore {
    pub runs: SqliteRunRepository,
    pub params: SqliteParamsRepository,
    pub metrics: SqliteMetricRepository,
}

impl SqliteTrainingStore {
    pub fn new(db: Database) -> Self {
        Self::shared(Arc::new(StdMutex::new(db)))
    }

    pub fn shared(db: Arc<StdMutex<Database>>) -> Self {
        Self {
            runs: SqliteRunRepository::new(Arc::clone(&db)),
            params: SqliteParamsRepository::new(Arc::clone(&db)),
            metrics: SqliteMetricRepository::new(db),
        }
    }
}

impl MetricOwnerLookup for SqliteTrainingStore {
    fn find_run(&self, run_id: RunId) -> TrainingResult<Option<TrainingRun>> {
        self.runs.get_run(run_id).map_err(|e| TrainingError::Lookup(e.to_string()))
    }

    fn epoch_recorded(&self, run_id: RunId, family: MetricFamily, epoch: u32) -> TrainingResult<bool> {
        self.metrics
            .epoch_recorded(run_id, family, epoch)
            .map_err(|e| TrainingError::Lookup(e.to_string()))
    }
}
