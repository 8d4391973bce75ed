//! TrainRelay Core - control plane and telemetry relay for an external training job.
//!
//! This crate provides:
//! - Start/stop/status commands proxied to the training job (`control`)
//! - Metric ingestion and queries over a SQLite store (`metrics`, `storage`)
//! - A single upstream event-stream connection fanned out to subscribers (`relay`)
//! - The shared session view of the remote job (`session`)
//! - The HTTP and WebSocket surface (`server`)
//!
//! # Example
//!
//! ```rust,no_run
//! use trainrelay_core::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> trainrelay_core::error::Result<()> {
//!     let config = Config::load()?;
//!     server::run(&config).await
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod session;
pub mod storage;

pub use config::Config;
pub use control::{ControlClient, StartOutcome, StartRequest, TrainingCoordinator};
pub use error::{CoreError, Result};
pub use metrics::{ArtifactFile, MetricsStore, StoreError, StoreResult};
pub use relay::{
    EventHub, RelayError, Subscription, TrainingEventRelay, UpstreamConnector, UpstreamFrame,
    UpstreamStream, WebSocketConnector,
};
pub use server::AppState;
pub use session::{ConnectionState, SessionSnapshot, SessionState};
pub use storage::{Database, SqliteTrainingStore, StorageError};
