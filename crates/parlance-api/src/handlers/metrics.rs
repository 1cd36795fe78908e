//! Metrics endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::Response;
use parlance_telemetry::GatePathStats;
use serde_json::{Value, json};
use tracing::error;

use crate::error::ApiError;
use crate::state::ApiState;

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics_text(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|err| {
        error!(error = %err, "failed to render metrics");
        ApiError::internal("failed to render metrics")
    })?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map_err(|_| ApiError::internal("failed to build metrics response"))
}

/// `GET /metrics/json` — aggregated local stats for dashboards.
pub async fn metrics_json(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let counts: HashMap<String, i64> = state.store.count_by_status().await?.into_iter().collect();
    let by = |status: &str| counts.get(status).copied().unwrap_or(0);
    let total: i64 = counts.values().sum();

    let (samples, sum_seconds) = state.metrics.processing_stats();
    #[allow(clippy::cast_precision_loss)]
    let avg_processing_seconds = if samples == 0 {
        0.0
    } else {
        sum_seconds / samples as f64
    };

    Ok(Json(json!({
        "total": total,
        "queued": by("queued"),
        "running": by("running"),
        "succeeded": by("succeeded"),
        "failed": by("failed"),
        "avg_processing_seconds": avg_processing_seconds,
    })))
}

/// `GET /metrics/gate-paths` — gate-path distribution with percentages.
pub async fn gate_paths(State(state): State<Arc<ApiState>>) -> Json<GatePathStats> {
    Json(state.metrics.gate_path_stats())
}
