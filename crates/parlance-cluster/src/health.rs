//! Peer health polling and the in-memory health table.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parlance_config::ClusterConfig;
use parlance_telemetry::Metrics;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

/// Up/down state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// The last health probe answered 200.
    Up,
    /// The last health probe failed or timed out.
    Down,
}

impl NodeStatus {
    /// Wire label (`up` / `down`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// One peer's health as reported by `/cluster/nodes`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealthView {
    /// Node name.
    pub name: String,
    /// Current status.
    pub status: NodeStatus,
    /// Time of the last successful probe; survives transitions to down.
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct NodeHealth {
    status: NodeStatus,
    last_seen: Option<DateTime<Utc>>,
}

/// Periodic health poller updating in-memory state and node gauges.
#[derive(Clone)]
pub struct HealthMonitor {
    config: Arc<ClusterConfig>,
    http: Client,
    metrics: Metrics,
    state: Arc<Mutex<BTreeMap<String, NodeHealth>>>,
}

impl HealthMonitor {
    /// Monitor over the given topology, reusing the cluster HTTP client.
    #[must_use]
    pub fn new(config: Arc<ClusterConfig>, http: Client, metrics: Metrics) -> Self {
        Self {
            config,
            http,
            metrics,
            state: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Probe every configured node once, concurrently.
    pub async fn check_all(&self) {
        let mut probes = JoinSet::new();
        for (name, base_url) in &self.config.nodes {
            let http = self.http.clone();
            let name = name.clone();
            let url = format!("{}/health", base_url.trim_end_matches('/'));
            let timeout = Duration::from_secs(self.config.internal_request_timeout_seconds);
            probes.spawn(async move {
                let up = matches!(
                    http.get(&url).timeout(timeout).send().await,
                    Ok(response) if response.status().as_u16() == 200
                );
                (name, up)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let Ok((name, up)) = joined else { continue };
            self.record_probe(&name, up);
        }
    }

    /// Record a probe outcome, preserving `last_seen` on failures.
    pub fn record_probe(&self, name: &str, up: bool) {
        let now = Utc::now();
        {
            let mut state = self.lock_state();
            let entry = state.entry(name.to_string()).or_insert(NodeHealth {
                status: NodeStatus::Down,
                last_seen: None,
            });
            if up {
                entry.status = NodeStatus::Up;
                entry.last_seen = Some(now);
            } else {
                entry.status = NodeStatus::Down;
            }
        }

        self.metrics.set_node_up(name, up);
        if up {
            #[allow(clippy::cast_precision_loss)]
            let ts = now.timestamp_millis() as f64 / 1000.0;
            self.metrics.set_node_last_health(name, ts);
        }
        debug!(node = %name, up, "health probe recorded");
    }

    /// Snapshot of per-peer health, sorted by node name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeHealthView> {
        let state = self.lock_state();
        self.config
            .nodes
            .keys()
            .map(|name| {
                state.get(name).map_or_else(
                    || NodeHealthView {
                        name: name.clone(),
                        status: NodeStatus::Down,
                        last_seen: None,
                    },
                    |health| NodeHealthView {
                        name: name.clone(),
                        status: health.status,
                        last_seen: health.last_seen,
                    },
                )
            })
            .collect()
    }

    /// Spawn the background loop probing peers every configured interval
    /// until the shutdown signal flips to `true`.
    #[must_use]
    pub fn run(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.health_check_interval_seconds.max(1));
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "health loop started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                self.check_all().await;
                tokio::select! {
                    _ = shutdown.changed() => {}
                    () = tokio::time::sleep(interval) => {}
                }
            }
            info!("health loop stopped");
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, BTreeMap<String, NodeHealth>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("health state mutex poisoned; continuing with recovered guard");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as ConfigMap;

    fn monitor(names: &[&str]) -> HealthMonitor {
        let mut nodes = ConfigMap::new();
        for name in names {
            nodes.insert((*name).to_string(), format!("http://{name}:8000"));
        }
        let config = Arc::new(ClusterConfig {
            self_name: names[0].to_string(),
            nodes,
            health_check_interval_seconds: 5,
            internal_request_timeout_seconds: 1,
            enable_round_robin: true,
            rr_state_file: None,
        });
        HealthMonitor::new(config, Client::new(), Metrics::new().expect("metrics"))
    }

    #[test]
    fn snapshot_defaults_to_down_with_no_probes() {
        let monitor = monitor(&["node-a", "node-b"]);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|view| view.status == NodeStatus::Down));
        assert!(snapshot.iter().all(|view| view.last_seen.is_none()));
    }

    #[test]
    fn failed_probe_preserves_last_seen() {
        let monitor = monitor(&["node-a", "node-b"]);
        monitor.record_probe("node-b", true);
        let seen = monitor.snapshot()[1].last_seen.expect("last seen set");

        monitor.record_probe("node-b", false);
        let view = &monitor.snapshot()[1];
        assert_eq!(view.status, NodeStatus::Down);
        assert_eq!(view.last_seen, Some(seen));
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let monitor = monitor(&["node-c", "node-a", "node-b"]);
        let names: Vec<String> = monitor
            .snapshot()
            .into_iter()
            .map(|view| view.name)
            .collect();
        assert_eq!(names, vec!["node-a", "node-b", "node-c"]);
    }
}
