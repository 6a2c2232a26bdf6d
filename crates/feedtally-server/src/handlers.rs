// HTTP request handlers for server mode
//
// Implements the engagement ingest endpoint plus liveness and readiness probes

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use feedtally_handlers::{IngestError, ResponseEnvelope};
use metrics::{counter, histogram};
use serde_json::{json, Value};
use tracing::debug;

use crate::{AppError, AppState};

pub(crate) const HEALTH_BODY: &str = "feedtally health OK";

/// POST /api/recordop - one engagement delta
pub(crate) async fn record_op(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ResponseEnvelope>, AppError> {
    counter!("feedtally.http.recordop", 1);

    // Bodies over the router's limit never reach us as bytes.
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            IngestError::PayloadTooLarge {
                size: declared_length(&headers).unwrap_or(state.max_payload_bytes + 1),
                limit: state.max_payload_bytes,
            }
        } else {
            IngestError::invalid(rejection.body_text())
        }
    })?;

    debug!("Received engagement delta ({} bytes)", body.len());
    histogram!("feedtally.http.recordop.bytes", body.len() as f64);

    state.pipeline.ingest.handle(&body).await?;
    Ok(Json(ResponseEnvelope::success(Value::Null)))
}

/// GET /, /ping, /health - Basic health check
pub(crate) async fn health_check() -> &'static str {
    HEALTH_BODY
}

/// GET /ready - Readiness check against both backends
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.pipeline.cache.ping().await;
    let sink = state.pipeline.sink.ping().await;

    let status = if cache.is_ok() && sink.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ready" } else { "unavailable" },
            "cache": probe(cache.map_err(|e| e.to_string())),
            "sink": probe(sink.map_err(|e| e.to_string())),
        })),
    )
}

fn probe(result: Result<(), String>) -> Value {
    match result {
        Ok(()) => json!("ok"),
        Err(reason) => json!(reason),
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
