//! REST handlers.

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;
use trainrelay_training::{
    MetricFamily, MetricRecord, RunId, RunType, TrainingParams, TrainingRun, TrainingState, TrainingStatus, UserId,
};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::control::{StartOutcome, StartRequest};
use crate::metrics::ArtifactFile;
use crate::session::SessionSnapshot;

fn default_top_n() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct TopResultsQuery {
    #[serde(alias = "userId")]
    pub user_id: UserId,
    #[serde(default = "default_top_n")]
    pub n: usize,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(alias = "userId")]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    #[serde(alias = "userId")]
    pub user_id: UserId,
    #[serde(default, alias = "runType")]
    pub run_type: Option<RunType>,
    pub name: String,
}

// ----------------------------------------------------------------------
// Control
// ----------------------------------------------------------------------

/// An empty body starts with default params.
///
/// A started job whose run could not be recorded answers 500 with the status body.
pub async fn start(State(state): State<AppState>, body: Bytes) -> ApiResult<(StatusCode, Json<StartOutcome>)> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid start request: {e}")))?
    };
    let outcome = state.coordinator.start(request).await;
    let code = if outcome.run_error.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        command_status(&outcome.status)
    };
    Ok((code, Json(outcome)))
}

pub async fn stop(State(state): State<AppState>) -> (StatusCode, Json<TrainingStatus>) {
    let status = state.coordinator.stop().await;
    (command_status(&status), Json(status))
}

/// Always 200; an unreachable job reports `unknown`.
pub async fn status(State(state): State<AppState>) -> Json<TrainingStatus> {
    Json(state.coordinator.status().await)
}

pub async fn session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

fn command_status(status: &TrainingStatus) -> StatusCode {
    if status.status == TrainingState::Failed { StatusCode::BAD_REQUEST } else { StatusCode::OK }
}

// ----------------------------------------------------------------------
// Metrics
// ----------------------------------------------------------------------

/// The body is the metric payload plus the owning `run_id`.
pub async fn submit_metric(
    State(state): State<AppState>,
    Path(family): Path<String>,
    Json(mut body): Json<Value>,
) -> ApiResult<(StatusCode, Json<MetricRecord>)> {
    let family: MetricFamily = family.parse()?;
    let run_id = take_run_id(&mut body)?;
    let record = state.store.submit(family, body, run_id)?;
    Ok((StatusCode::CREATED, Json(record)))
}

fn take_run_id(body: &mut Value) -> ApiResult<RunId> {
    let object = body
        .as_object_mut()
        .ok_or_else(|| ApiError::BadRequest("metric payload must be a JSON object".to_string()))?;
    let raw = object
        .remove("run_id")
        .or_else(|| object.remove("runId"))
        .ok_or_else(|| ApiError::BadRequest("run_id is required".to_string()))?;
    serde_json::from_value(raw).map_err(|e| ApiError::BadRequest(format!("invalid run_id: {e}")))
}

pub async fn latest_metric(
    State(state): State<AppState>,
    Path(family): Path<String>,
) -> ApiResult<Json<MetricRecord>> {
    let family: MetricFamily = family.parse()?;
    Ok(Json(state.store.latest(family)?))
}

pub async fn top_results(
    State(state): State<AppState>,
    Query(query): Query<TopResultsQuery>,
) -> ApiResult<Json<Vec<MetricRecord>>> {
    Ok(Json(state.store.top_n(query.user_id, query.n)?))
}

// ----------------------------------------------------------------------
// Runs
// ----------------------------------------------------------------------

pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> ApiResult<(StatusCode, Json<TrainingRun>)> {
    let run_type = request.run_type.unwrap_or(RunType::ZoneDetection);
    let run = state.store.create_run(request.user_id, run_type, &request.name)?;
    Ok((StatusCode::CREATED, Json(run)))
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<TrainingRun>>> {
    Ok(Json(state.store.runs_for_user(query.user_id)?))
}

pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<Json<TrainingRun>> {
    Ok(Json(state.store.get_run(run_id)?))
}

pub async fn delete_run(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<StatusCode> {
    state.store.delete_run(run_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn save_params(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(params): Json<TrainingParams>,
) -> ApiResult<(StatusCode, Json<TrainingParams>)> {
    params.validate()?;
    state.store.save_params(run_id, &params)?;
    Ok((StatusCode::CREATED, Json(params)))
}

pub async fn get_params(State(state): State<AppState>, Path(run_id): Path<RunId>) -> ApiResult<Json<TrainingParams>> {
    Ok(Json(state.store.params_for_run(run_id)?))
}

pub async fn run_metrics(
    State(state): State<AppState>,
    Path((run_id, family)): Path<(RunId, String)>,
) -> ApiResult<Json<Vec<MetricRecord>>> {
    let family: MetricFamily = family.parse()?;
    Ok(Json(state.store.by_run(run_id, family)?))
}

// ----------------------------------------------------------------------
// Remote metrics pass-through
// ----------------------------------------------------------------------

fn passthrough(reply: Option<Value>, what: &str) -> ApiResult<Json<Value>> {
    reply.map(Json).ok_or_else(|| ApiError::Upstream(format!("no reply for {what}")))
}

pub async fn remote_metrics(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> ApiResult<Json<Value>> {
    passthrough(state.coordinator.control().remote_metrics(query.limit).await, "metrics")
}

pub async fn remote_metrics_summary(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    passthrough(state.coordinator.control().remote_metrics_summary().await, "metrics summary")
}

pub async fn remote_epoch_metrics(State(state): State<AppState>, Path(epoch): Path<u32>) -> ApiResult<Json<Value>> {
    passthrough(state.coordinator.control().remote_epoch_metrics(epoch).await, "epoch metrics")
}

pub async fn remote_latest_zone(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    passthrough(state.coordinator.control().remote_latest_zone().await, "latest zone metrics")
}

// ----------------------------------------------------------------------
// Relay control
// ----------------------------------------------------------------------

pub async fn relay_connect(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.relay.connect().await }))
}

pub async fn relay_disconnect(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.relay.disconnect().await }))
}

pub async fn relay_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": state.relay.state(),
        "subscribers": state.relay.hub().subscriber_count(),
    }))
}

// ----------------------------------------------------------------------
// Artifacts
// ----------------------------------------------------------------------

pub async fn model_artifact(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(stream_artifact(state.store.open_model().await?))
}

pub async fn image_artifact(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Response> {
    Ok(stream_artifact(state.store.open_image(&name).await?))
}

fn stream_artifact(artifact: ArtifactFile) -> Response {
    let extension = artifact.path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let content_type = match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    let filename = artifact.path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");

    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CONTENT_LENGTH, artifact.len.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
    ];
    (headers, Body::from_stream(ReaderStream::new(artifact.file))).into_response()
}
