//! Cluster-wide aggregation of job listings and metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use parlance_config::ClusterConfig;
use parlance_telemetry::LocalMetrics;
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::debug;

use crate::health::{NodeHealthView, NodeStatus};

/// Per-node reachability summary attached to the merged job listing.
#[derive(Debug, Clone, Serialize)]
pub struct NodeJobsSummary {
    /// Node name.
    pub name: String,
    /// Whether the node answered within the cluster timeout.
    pub reachable: bool,
    /// Number of jobs the node reported.
    pub job_count: usize,
}

/// Merged job listing across the cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterJobs {
    /// Jobs from every reachable node, newest first.
    pub items: Vec<serde_json::Value>,
    /// Per-node reachability summary.
    pub nodes: Vec<NodeJobsSummary>,
}

/// One node's aggregated metrics for the summary endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetricsSummary {
    /// Node name.
    pub name: String,
    /// Up/down from the current node's health view.
    pub up: bool,
    /// Jobs owned by the node, summed across all peer reports.
    pub jobs_owned_total: u64,
    /// Currently active jobs, summed across all peer reports.
    pub jobs_active: i64,
    /// Jobs submitted with this node as the round-robin target.
    pub jobs_submitted_as_target: u64,
    /// Unix timestamp of the last successful health probe.
    pub last_health_ts: Option<f64>,
}

/// Aggregated metrics across the cluster.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    /// Per-node aggregation, sorted by name.
    pub nodes: Vec<NodeMetricsSummary>,
}

/// Fan out to every node's `/admin/jobs` and merge the listings.
///
/// Unreachable peers appear in the summary as `reachable=false` with zero
/// jobs; the merge is sorted by `created_at` descending (ISO8601 strings
/// compare correctly) and truncated to `limit` when given.
pub async fn aggregate_cluster_jobs(
    config: &ClusterConfig,
    http: &Client,
    status: Option<&str>,
    since: Option<&str>,
    limit: Option<usize>,
) -> ClusterJobs {
    let timeout = Duration::from_secs(config.internal_request_timeout_seconds);
    let mut fetches = JoinSet::new();
    for (name, base_url) in &config.nodes {
        let http = http.clone();
        let name = name.clone();
        let url = format!("{}/admin/jobs", base_url.trim_end_matches('/'));
        let mut params = vec![("internal".to_string(), "1".to_string())];
        if let Some(status) = status {
            params.push(("status".to_string(), status.to_string()));
        }
        if let Some(since) = since {
            params.push(("since".to_string(), since.to_string()));
        }
        fetches.spawn(async move {
            let jobs = fetch_node_jobs(&http, &url, &params, timeout).await;
            (name, jobs)
        });
    }

    let mut per_node: BTreeMap<String, Option<Vec<serde_json::Value>>> = BTreeMap::new();
    while let Some(joined) = fetches.join_next().await {
        let Ok((name, jobs)) = joined else { continue };
        per_node.insert(name, jobs);
    }

    let mut items = Vec::new();
    let mut nodes = Vec::new();
    for (name, jobs) in per_node {
        match jobs {
            Some(jobs) => {
                nodes.push(NodeJobsSummary {
                    name,
                    reachable: true,
                    job_count: jobs.len(),
                });
                items.extend(jobs);
            }
            None => nodes.push(NodeJobsSummary {
                name,
                reachable: false,
                job_count: 0,
            }),
        }
    }

    sort_jobs_newest_first(&mut items);
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    ClusterJobs { items, nodes }
}

async fn fetch_node_jobs(
    http: &Client,
    url: &str,
    params: &[(String, String)],
    timeout: Duration,
) -> Option<Vec<serde_json::Value>> {
    let response = http
        .get(url)
        .query(params)
        .timeout(timeout)
        .send()
        .await
        .ok()?;
    if response.status().as_u16() != 200 {
        return None;
    }
    let payload: serde_json::Value = response.json().await.ok()?;
    Some(payload.get("jobs")?.as_array()?.clone())
}

/// Sort merged job objects by their `created_at` string, newest first.
pub fn sort_jobs_newest_first(items: &mut [serde_json::Value]) {
    items.sort_by(|a, b| {
        let a_key = a.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
        let b_key = b.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
        b_key.cmp(a_key)
    });
}

/// Pull every node's `/cluster/local-metrics` and fold them into a per-node
/// summary; up/down reflects this node's health view.
pub async fn aggregate_metrics_summary(
    config: &ClusterConfig,
    http: &Client,
    health: &[NodeHealthView],
) -> MetricsSummary {
    let timeout = Duration::from_secs(config.internal_request_timeout_seconds);
    let mut fetches = JoinSet::new();
    for base_url in config.nodes.values() {
        let http = http.clone();
        let url = format!("{}/cluster/local-metrics", base_url.trim_end_matches('/'));
        fetches.spawn(async move { fetch_local_metrics(&http, &url, timeout).await });
    }

    let mut reports: Vec<LocalMetrics> = Vec::new();
    while let Some(joined) = fetches.join_next().await {
        if let Ok(Some(report)) = joined {
            reports.push(report);
        } else {
            debug!("skipping unreachable peer in metrics summary");
        }
    }

    let nodes = config
        .nodes
        .keys()
        .map(|name| summarize_node(name, &reports, health))
        .collect();
    MetricsSummary { nodes }
}

async fn fetch_local_metrics(http: &Client, url: &str, timeout: Duration) -> Option<LocalMetrics> {
    let response = http.get(url).timeout(timeout).send().await.ok()?;
    if response.status().as_u16() != 200 {
        return None;
    }
    response.json().await.ok()
}

fn summarize_node(
    name: &str,
    reports: &[LocalMetrics],
    health: &[NodeHealthView],
) -> NodeMetricsSummary {
    let jobs_owned_total = reports
        .iter()
        .filter_map(|report| report.jobs_owned.get(name))
        .sum();
    let jobs_active = reports
        .iter()
        .filter_map(|report| report.jobs_active.get(name))
        .sum();
    let jobs_submitted_as_target = reports
        .iter()
        .flat_map(|report| &report.jobs_submitted)
        .filter(|(key, _)| key.rsplit(',').next() == Some(name))
        .map(|(_, count)| count)
        .sum();

    let health_entry = health.iter().find(|view| view.name == name);
    NodeMetricsSummary {
        name: name.to_string(),
        up: health_entry.is_some_and(|view| view.status == NodeStatus::Up),
        jobs_owned_total,
        jobs_active,
        jobs_submitted_as_target,
        #[allow(clippy::cast_precision_loss)]
        last_health_ts: health_entry
            .and_then(|view| view.last_seen)
            .map(|seen| seen.timestamp_millis() as f64 / 1000.0),
    }
}
