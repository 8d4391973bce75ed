//! Ties control commands to run bookkeeping.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use trainrelay_training::{RunType, TrainingParams, TrainingRun, TrainingState, TrainingStatus, UserId};

use crate::control::ControlClient;
use crate::metrics::{MetricsStore, StoreResult};
use crate::session::SessionState;

/// Body of an inbound start request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    /// Owner of the run to record. Without one, the job is started but no run is stored.
    #[serde(default, alias = "userId")]
    pub user_id: Option<UserId>,
    #[serde(default, alias = "runType")]
    pub run_type: Option<RunType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub params: TrainingParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    #[serde(flatten)]
    pub status: TrainingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<TrainingRun>,
    /// Set when the job started but the run could not be recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_error: Option<String>,
}

/// Start/stop/status with run creation and session bookkeeping.
#[derive(Clone)]
pub struct TrainingCoordinator {
    control: ControlClient,
    store: MetricsStore,
    session: Arc<SessionState>,
}

impl TrainingCoordinator {
    pub fn new(control: ControlClient, store: MetricsStore, session: Arc<SessionState>) -> Self {
        Self { control, store, session }
    }

    #[must_use]
    pub fn control(&self) -> &ControlClient {
        &self.control
    }

    /// Starts the job. When the job confirms and an owner is named, records the
    /// run and its parameter snapshot and marks it active.
    ///
    /// A run that cannot be recorded leaves no active run and is reported in
    /// `run_error`; the job itself keeps running.
    pub async fn start(&self, request: StartRequest) -> StartOutcome {
        let already_running = self.session.last_status().status == TrainingState::Running;
        let status = self.control.start(request.params.clone()).await;

        let confirmed = !already_running && !status.is_local() && status.status == TrainingState::Running;
        let (run, run_error) = match request.user_id {
            Some(user_id) if confirmed => match self.record_run(user_id, &request) {
                Ok(run) => (Some(run), None),
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "Failed to record training run");
                    (None, Some(e.to_string()))
                }
            },
            _ => (None, None),
        };

        StartOutcome { status, run, run_error }
    }

    /// Creates the run with its params, or nothing at all.
    fn record_run(&self, user_id: UserId, request: &StartRequest) -> StoreResult<TrainingRun> {
        let run_type = request.run_type.unwrap_or(RunType::ZoneDetection);
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| format!("{} {}", run_type, Utc::now().format("%Y-%m-%d %H:%M:%S")));
        let params = self.control.normalize(request.params.clone());

        let run = self.store.create_run(user_id, run_type, &name)?;
        if let Err(e) = self.store.save_params(run.id, &params) {
            if let Err(cleanup) = self.store.delete_run(run.id) {
                warn!(run_id = %run.id, error = %cleanup, "Failed to remove run without params");
            }
            return Err(e);
        }

        self.session.set_active_run(Some(run.id));
        info!(run_id = %run.id, user_id = %user_id, "Training run active");
        Ok(run)
    }

    /// Stops the job; a confirmed stop clears the active run.
    pub async fn stop(&self) -> TrainingStatus {
        let status = self.control.stop().await;
        if !status.is_local() && status.status == TrainingState::Stopped {
            if let Some(run_id) = self.session.active_run() {
                info!(run_id = %run_id, "Training run no longer active");
            }
            self.session.set_active_run(None);
        }
        status
    }

    /// Polls the job; a terminal status from the job clears the active run.
    pub async fn status(&self) -> TrainingStatus {
        let status = self.control.status().await;
        if !status.is_local() && status.status.is_terminal() {
            self.session.set_active_run(None);
        }
        status
    }
}
