//! Storage layer for TrainRelay.
//!
//! SQLite persistence for training runs, their parameter snapshots and
//! per-epoch metrics, using the Repository pattern.

// SQL strings don't need hash-less raw strings
#![allow(clippy::needless_raw_string_hashes)]

pub mod database;
pub mod error;
pub mod repositories;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use repositories::{
    MetricRepository, ParamsRepository, RunRepository, SqliteMetricRepository,
    SqliteParamsRepository, SqliteRunRepository, SqliteTrainingStore,
};
