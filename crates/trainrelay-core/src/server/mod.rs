//! HTTP and WebSocket surface.
//!
//! Wires the control client, metrics store, relay and session into an axum
//! router and serves it.

pub mod error;
pub mod logging;
pub mod routes;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::config::Config;
use crate::control::{ControlClient, TrainingCoordinator};
use crate::error::Result;
use crate::metrics::MetricsStore;
use crate::relay::{EventHub, TrainingEventRelay, WebSocketConnector};
use crate::session::SessionState;
use crate::storage::{Database, SqliteTrainingStore};
use logging::RequestLoggerLayer;

/// Extra time a request may take beyond one upstream round trip.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Shared handles for every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: TrainingCoordinator,
    pub store: MetricsStore,
    pub relay: TrainingEventRelay,
    pub session: Arc<SessionState>,
}

impl AppState {
    pub fn new(
        control: ControlClient,
        store: MetricsStore,
        relay: TrainingEventRelay,
        session: Arc<SessionState>,
    ) -> Self {
        let coordinator = TrainingCoordinator::new(control, store.clone(), Arc::clone(&session));
        Self { coordinator, store, relay, session }
    }

    /// Opens the database and builds every component from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = Database::open(&config.storage.database_path)?;
        let store = MetricsStore::new(SqliteTrainingStore::new(db), config.artifact_layout());

        let session = Arc::new(SessionState::new());
        let control = ControlClient::new(&config.upstream, config.deployment.clone(), Arc::clone(&session))?;
        let connector =
            WebSocketConnector::new(config.upstream.events_url.clone(), config.upstream.connect_timeout());
        let relay = TrainingEventRelay::new(
            Arc::new(connector),
            Arc::clone(&session),
            EventHub::new(config.relay.channel_capacity),
        );

        Ok(Self::new(control, store, relay, session))
    }
}

/// Builds the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(routes::start))
        .route("/stop", post(routes::stop))
        .route("/status", get(routes::status))
        .route("/session", get(routes::session))
        .route("/metrics/top-results", get(routes::top_results))
        .route("/metrics/:family", post(routes::submit_metric))
        .route("/metrics/:family/latest", get(routes::latest_metric))
        .route("/runs", post(routes::create_run).get(routes::list_runs))
        .route("/runs/:id", get(routes::get_run).delete(routes::delete_run))
        .route("/runs/:id/params", post(routes::save_params).get(routes::get_params))
        .route("/runs/:id/metrics/:family", get(routes::run_metrics))
        .route("/remote/metrics", get(routes::remote_metrics))
        .route("/remote/metrics/summary", get(routes::remote_metrics_summary))
        .route("/remote/metrics/:epoch", get(routes::remote_epoch_metrics))
        .route("/remote/metrics-zone/latest", get(routes::remote_latest_zone))
        .route("/relay/connect", get(routes::relay_connect))
        .route("/relay/disconnect", get(routes::relay_disconnect))
        .route("/relay/status", get(routes::relay_status))
        .route("/relay/ws", get(ws::relay_socket))
        .route("/artifacts/model", get(routes::model_artifact))
        .route("/artifacts/images/:name", get(routes::image_artifact))
        .layer(ServiceBuilder::new().layer(RequestLoggerLayer).layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Start the TrainRelay HTTP server and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the components cannot be built or the server fails to bind.
pub async fn run(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    if config.relay.connect_on_startup {
        state.relay.connect().await;
    }

    let app = router(state.clone())
        .layer(TimeoutLayer::new(config.upstream.request_timeout() + REQUEST_TIMEOUT_MARGIN));

    let addr = config.server.address;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, upstream = %config.upstream.base_url, "Starting TrainRelay server");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    state.relay.disconnect().await;
    info!("TrainRelay server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
