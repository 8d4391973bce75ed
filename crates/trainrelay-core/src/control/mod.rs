//! Control plane: start/stop/status commands against the external training job.
//!
//! Every operation is one HTTP round trip bounded by the configured timeout,
//! with no retry. Transport failures never escape as errors; they come back
//! as a locally produced `TrainingStatus`.

pub mod coordinator;

pub use coordinator::{StartOutcome, StartRequest, TrainingCoordinator};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use trainrelay_training::{StatusDocument, TrainingParams, TrainingState, TrainingStatus};

use crate::config::{DeploymentConfig, UpstreamConfig};
use crate::session::SessionState;

/// Body of the job's start command, in the job's field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    data_path: Option<String>,
    batch_size: u32,
    epochs: u32,
    learning_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pretrained_weights: Option<String>,
}

impl From<&TrainingParams> for StartCommand {
    fn from(params: &TrainingParams) -> Self {
        Self {
            data_path: params.dataset_path.clone(),
            batch_size: params.batch_size,
            epochs: params.epochs,
            learning_rate: params.learning_rate,
            pretrained_weights: params.pretrained_weight_path.clone(),
        }
    }
}

/// HTTP client for the job's command and status endpoints.
#[derive(Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
    deployment: DeploymentConfig,
    session: Arc<SessionState>,
}

impl ControlClient {
    /// Builds a client whose requests are bounded by the upstream timeouts.
    pub fn new(
        upstream: &UpstreamConfig,
        deployment: DeploymentConfig,
        session: Arc<SessionState>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(upstream.request_timeout())
            .connect_timeout(upstream.connect_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            deployment,
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Applies deployment-fixed paths over caller-supplied ones.
    #[must_use]
    pub fn normalize(&self, mut params: TrainingParams) -> TrainingParams {
        if let Some(path) = &self.deployment.dataset_path {
            params.dataset_path = Some(path.clone());
        }
        if let Some(weights) = &self.deployment.pretrained_weights {
            params.pretrained_weight_path = Some(weights.clone());
        }
        params
    }

    /// Sends the start command.
    ///
    /// A start while the last known status is `running` returns that status
    /// without contacting the job.
    pub async fn start(&self, params: TrainingParams) -> TrainingStatus {
        let current = self.session.last_status();
        if current.status == TrainingState::Running {
            info!("Start requested while training is running; ignoring");
            return current;
        }

        let params = self.normalize(params);
        if let Err(e) = params.validate() {
            warn!(error = %e, "Rejected start request");
            return TrainingStatus::local_failure("start", e);
        }

        info!(
            batch_size = params.batch_size,
            epochs = params.epochs,
            learning_rate = params.learning_rate,
            "Sending start command"
        );
        let request = self.http.post(self.url("start")).json(&StartCommand::from(&params));
        self.command("start", request).await
    }

    /// Sends the stop command.
    pub async fn stop(&self) -> TrainingStatus {
        info!("Sending stop command");
        let request = self.http.post(self.url("stop"));
        self.command("stop", request).await
    }

    /// Polls the job's status. An unreachable job yields `unknown`.
    pub async fn status(&self) -> TrainingStatus {
        let response = match self.http.get(self.url("status")).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Training job status poll failed");
                return TrainingStatus::unreachable(e);
            }
        };

        let code = response.status();
        match read_status(response).await {
            Ok(Some(status)) => {
                debug!(status = %status.status, http_status = %code, "Training job status");
                self.session.set_last_status(status.clone());
                status
            }
            Ok(None) => {
                warn!(http_status = %code, "Training job status reply carried no status");
                TrainingStatus::unreachable(format!("HTTP {code}: no status in reply"))
            }
            Err(e) => {
                warn!(error = %e, "Failed to read training job status reply");
                TrainingStatus::unreachable(e)
            }
        }
    }

    async fn command(&self, action: &str, request: reqwest::RequestBuilder) -> TrainingStatus {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(action, error = %e, "Training job command failed");
                return TrainingStatus::local_failure(action, e);
            }
        };

        let code = response.status();
        match read_status(response).await {
            Ok(Some(status)) => {
                if !code.is_success() {
                    warn!(action, http_status = %code, status = %status.status, "Training job rejected command");
                }
                info!(action, status = %status.status, message = %status.message, "Training job replied");
                self.session.set_last_status(status.clone());
                status
            }
            Ok(None) => {
                error!(action, http_status = %code, "Training job reply carried no status");
                TrainingStatus::local_failure(action, format!("HTTP {code}: no status in reply"))
            }
            Err(e) => {
                error!(action, error = %e, "Failed to read training job reply");
                TrainingStatus::local_failure(action, e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Remote metrics pass-through
    // ------------------------------------------------------------------

    /// The job's own metric list, newest epoch first.
    pub async fn remote_metrics(&self, limit: Option<u32>) -> Option<Value> {
        let mut request = self.http.get(self.url("metrics"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        self.fetch_json("metrics", request).await
    }

    pub async fn remote_metrics_summary(&self) -> Option<Value> {
        self.fetch_json("metrics/summary", self.http.get(self.url("metrics/summary"))).await
    }

    pub async fn remote_epoch_metrics(&self, epoch: u32) -> Option<Value> {
        let path = format!("metrics/{epoch}");
        self.fetch_json(&path, self.http.get(self.url(&path))).await
    }

    pub async fn remote_latest_zone(&self) -> Option<Value> {
        self.fetch_json("metrics-zone/latest", self.http.get(self.url("metrics-zone/latest"))).await
    }

    async fn fetch_json(&self, path: &str, request: reqwest::RequestBuilder) -> Option<Value> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path, error = %e, "Remote metrics request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(path, http_status = %response.status(), "Remote metrics not available");
            return None;
        }
        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path, error = %e, "Remote metrics reply was not JSON");
                None
            }
        }
    }
}

/// Reads a status document from any reply, successful or not.
async fn read_status(response: reqwest::Response) -> Result<Option<TrainingStatus>, reqwest::Error> {
    let body = response.text().await?;
    Ok(serde_json::from_str::<StatusDocument>(&body).ok().and_then(StatusDocument::into_status))
}
