// Server mode - HTTP ingest plus the daily flush driver
//
// Runs anywhere a container or VM runs:
// - Docker containers
// - Kubernetes
// - Local development (memory backends)
//
// Features:
// - Axum HTTP server
// - Redis or in-process cache, MySQL or in-process sink
// - Interval- or traffic-driven flush, lock-guarded to once per day
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use feedtally_config::{FlushTrigger, RuntimeConfig};
use feedtally_core::{flush_target_day, Clock, SystemClock};
use feedtally_flush::{FlushReport, FlushScheduler};
use feedtally_handlers::{ErrorCode, IngestError, ResponseEnvelope};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

mod handlers;
mod init;

use handlers::{health_check, ready_check, record_op};
pub use init::{build_pipeline, init_cache, init_sink, init_tracing, Pipeline};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub max_payload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Pipeline, max_payload_bytes: usize) -> Self {
        Self {
            pipeline,
            max_payload_bytes,
        }
    }
}

/// Error type that implements IntoResponse
///
/// Failures are reported inside the same envelope as successes, with the
/// machine-readable code in `err_code`.
pub(crate) struct AppError {
    status: StatusCode,
    code: ErrorCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request error: {:?}", self.error);
        } else {
            debug!("Rejected request: {}", self.error);
        }
        (self.status, Json(ResponseEnvelope::failure(self.code))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.error_code(),
            error: err.into(),
        }
    }
}

/// Build the HTTP router for `state`.
pub fn router(state: AppState) -> Router {
    // Leave headroom so oversized bodies still reach the handler's own check.
    let body_limit = state.max_payload_bytes.saturating_mul(2);

    Router::new()
        .route("/api/recordop", post(record_op))
        .route("/", get(health_check))
        .route("/ping", get(health_check))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

async fn connect(config: &RuntimeConfig) -> Result<Pipeline> {
    let cache = init_cache(config).await?;
    let sink = init_sink(config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Ok(build_pipeline(config, cache, sink, clock))
}

/// Entry point for server mode (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point for server mode with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let addr = config.server.listen_addr.clone();
    let pipeline = connect(&config).await?;

    info!(
        "Max payload size set to {} bytes",
        config.request.max_payload_bytes
    );

    // Interval mode drives the coordinator from a ticker; traffic mode fires
    // from the ingest path instead.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = match config.flush.trigger {
        FlushTrigger::Interval => Some(
            FlushScheduler::new(pipeline.coordinator.clone(), config.flush.interval())
                .spawn(shutdown_rx),
        ),
        FlushTrigger::Traffic => {
            info!("Flush attempts are launched after each successful ingest");
            None
        }
    };

    let app = router(AppState::new(pipeline, config.request.max_payload_bytes));

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("feedtally HTTP endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/api/recordop - Engagement ingestion", addr);
    info!("  GET  http://{}/health       - Health check", addr);
    info!("  GET  http://{}/ready        - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the ticker; an attempt already running finishes first.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Run a single flush attempt in the foreground.
///
/// `day` defaults to the previous calendar day. With `force` the day lock is
/// taken over even if an earlier attempt holds it.
pub async fn flush_once(
    config: RuntimeConfig,
    day: Option<NaiveDate>,
    force: bool,
) -> Result<FlushReport> {
    init_tracing(&config);

    let pipeline = connect(&config).await?;
    let coordinator = &pipeline.coordinator;
    let report = match (day, force) {
        (Some(day), false) => coordinator.run(day).await,
        (None, false) => coordinator.run_previous_day().await,
        (day, true) => {
            let day = day.unwrap_or_else(|| flush_target_day(SystemClock.now()));
            coordinator.run_forced(day).await
        }
    };
    Ok(report)
}
