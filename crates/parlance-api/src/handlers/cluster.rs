//! Health and cluster aggregation endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use parlance_cluster::{
    ClusterJobs, MetricsSummary, aggregate_cluster_jobs, aggregate_metrics_summary,
};
use parlance_telemetry::LocalMetrics;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::ApiState;

/// `GET /healthz` — liveness only.
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /health` — liveness plus the node name, probed by peers.
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "node": state.self_name() }))
}

/// `GET /cluster/nodes` — per-peer health from the background loop.
pub async fn cluster_nodes(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({ "nodes": state.health.snapshot() }))
}

/// `GET /cluster/jobs` — merged job listing across every peer.
pub async fn cluster_jobs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ClusterJobs>, ApiError> {
    let limit = query
        .get("limit")
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| ApiError::bad_request(format!("invalid limit {raw:?}")))
        })
        .transpose()?;

    let merged = aggregate_cluster_jobs(
        &state.cluster,
        state.proxy.http(),
        query.get("status").map(String::as_str),
        query.get("since").map(String::as_str),
        limit,
    )
    .await;
    Ok(Json(merged))
}

/// `GET /cluster/local-metrics` — raw local state for peer aggregation.
pub async fn local_metrics(State(state): State<Arc<ApiState>>) -> Json<LocalMetrics> {
    Json(state.metrics.local_metrics())
}

/// `GET /cluster/metrics-summary` — aggregated metrics across the cluster.
pub async fn metrics_summary(State(state): State<Arc<ApiState>>) -> Json<MetricsSummary> {
    let health = state.health.snapshot();
    let summary = aggregate_metrics_summary(&state.cluster, state.proxy.http(), &health).await;
    Json(summary)
}
