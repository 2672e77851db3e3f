//! Road Hazard Service
//!
//! HTTP front for detection ingest, on-demand aggregation, hazard
//! verification, and live alert queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use aggregation::{AggregationJob, AggregationScheduler};
use alerting::{AlertCooldown, AlertEngine, CooldownConfig};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use storage::{Repository, StoreStats};
use tokio::sync::{watch, Mutex};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod error;
mod routes;
mod settings;

pub use error::{ApiError, ApiResult};
pub use settings::{LoggingSettings, ServerSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    /// Backing store for detections, hazards, and verifications
    pub repository: Arc<Repository>,
    pub job: Arc<AggregationJob>,
    pub alerts: AlertEngine,
    /// Per-session cooldowns for the `session` alert query parameter
    pub cooldowns: Mutex<HashMap<String, AlertCooldown>>,
    pub cooldown_config: CooldownConfig,
    /// Present when a Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the engine over an in-memory repository, rejecting unusable settings
    pub fn new(settings: &Settings, metrics: Option<PrometheusHandle>) -> anyhow::Result<Self> {
        let repository = Arc::new(Repository::new());
        let job = AggregationJob::new(
            repository.clone(),
            repository.clone(),
            repository.clone(),
            settings.clustering.clone(),
            settings.scoring.clone(),
            settings.aggregation.clone(),
        )
        .context("Invalid aggregation settings")?;
        let alerts = AlertEngine::new(repository.clone(), settings.alerts.clone())
            .context("Invalid alert settings")?;

        Ok(Self {
            alerts,
            repository,
            job: Arc::new(job),
            cooldowns: Mutex::new(HashMap::new()),
            cooldown_config: settings.cooldown.clone(),
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        })
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    /// `None` while the store is unreachable
    pub store: Option<StoreStats>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route("/api/v1/detections", post(routes::detections::submit_detection))
        .route("/api/v1/hazards", get(routes::hazards::list_nearby))
        .route("/api/v1/hazards/:id", get(routes::hazards::get_hazard))
        .route("/api/v1/hazards/:id/verify", post(routes::hazards::verify_hazard))
        .route(
            "/api/v1/admin/process-detections",
            post(routes::admin::process_detections),
        )
        .route("/api/v1/admin/stats", get(routes::admin::stats))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = match state.repository.stats() {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Health check: {}", e);
            None
        }
    };
    let (status, label) = if store.is_some() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let response = HealthResponse {
        status: label.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store,
    };

    (status, Json(response))
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let level = settings.level.parse::<Level>().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using info", settings.level);
        Level::INFO
    });

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Run the server and the aggregation scheduler until Ctrl-C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = init_metrics()?;
    let state = Arc::new(AppState::new(&settings, Some(metrics))?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = AggregationScheduler::new(state.job.clone(), settings.scheduler.clone());
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let app = create_router(state);

    info!("Starting hazard service on {}", settings.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler_task.await?;
    info!("Hazard service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
