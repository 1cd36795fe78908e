//! Round-robin upload scheduler with a persisted cursor.

use std::sync::Arc;

use parlance_config::ClusterConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Mutex-protected round-robin cursor over the sorted node names.
///
/// The index is persisted to the configured state file after every step so a
/// restart preserves fair dispersion; a corrupt state file resets to 0.
pub struct RoundRobinScheduler {
    config: Arc<ClusterConfig>,
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    index: usize,
    loaded: bool,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    index: usize,
}

impl RoundRobinScheduler {
    /// Scheduler over the given topology.
    #[must_use]
    pub fn new(config: Arc<ClusterConfig>) -> Self {
        Self {
            config,
            state: Mutex::new(SchedulerState {
                index: 0,
                loaded: false,
            }),
        }
    }

    /// Next target node for an upload.
    ///
    /// Returns the local node when round-robin is disabled or the topology is
    /// empty.
    pub async fn next_target(&self) -> String {
        let mut state = self.state.lock().await;
        if !state.loaded {
            state.index = self.load_index();
            state.loaded = true;
        }

        if !self.config.enable_round_robin {
            return self.config.self_name.clone();
        }
        let nodes = self.config.sorted_node_names();
        if nodes.is_empty() {
            return self.config.self_name.clone();
        }

        let target = nodes[state.index % nodes.len()].clone();
        state.index = (state.index + 1) % nodes.len();
        self.save_index(state.index);
        target
    }

    fn load_index(&self) -> usize {
        let Some(path) = &self.config.rr_state_file else {
            return 0;
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<PersistedState>(&raw) {
                Ok(state) => state.index,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "corrupt rr state file; resetting to 0");
                    0
                }
            },
            Err(_) => 0,
        }
    }

    fn save_index(&self, index: usize) {
        let Some(path) = &self.config.rr_state_file else {
            return;
        };
        let payload = match serde_json::to_string(&PersistedState { index }) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize rr state");
                return;
            }
        };
        if let Err(err) = std::fs::write(path, payload) {
            warn!(path = %path.display(), error = %err, "failed to persist rr state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn config(names: &[&str], rr_state_file: Option<PathBuf>, enabled: bool) -> Arc<ClusterConfig> {
        let mut nodes = BTreeMap::new();
        for name in names {
            nodes.insert((*name).to_string(), format!("http://{name}:8000"));
        }
        Arc::new(ClusterConfig {
            self_name: names.first().map_or("standalone", |n| *n).to_string(),
            nodes,
            health_check_interval_seconds: 5,
            internal_request_timeout_seconds: 5,
            enable_round_robin: enabled,
            rr_state_file,
        })
    }

    #[tokio::test]
    async fn cycles_through_sorted_nodes() {
        let scheduler = RoundRobinScheduler::new(config(&["node-b", "node-a", "node-c"], None, true));
        let picks = [
            scheduler.next_target().await,
            scheduler.next_target().await,
            scheduler.next_target().await,
            scheduler.next_target().await,
        ];
        assert_eq!(picks, ["node-a", "node-b", "node-c", "node-a"]);
    }

    #[tokio::test]
    async fn disabled_round_robin_always_picks_self() {
        let scheduler = RoundRobinScheduler::new(config(&["node-a", "node-b"], None, false));
        assert_eq!(scheduler.next_target().await, "node-a");
        assert_eq!(scheduler.next_target().await, "node-a");
    }

    #[tokio::test]
    async fn cursor_persists_across_restarts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state_file = dir.path().join("rr.json");

        let scheduler = RoundRobinScheduler::new(config(
            &["node-a", "node-b"],
            Some(state_file.clone()),
            true,
        ));
        assert_eq!(scheduler.next_target().await, "node-a");
        drop(scheduler);

        let scheduler = RoundRobinScheduler::new(config(
            &["node-a", "node-b"],
            Some(state_file),
            true,
        ));
        assert_eq!(
            scheduler.next_target().await,
            "node-b",
            "restart resumes where the cursor left off"
        );
    }

    #[tokio::test]
    async fn corrupt_state_file_resets_to_zero() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state_file = dir.path().join("rr.json");
        std::fs::write(&state_file, "{not json").expect("write garbage");

        let scheduler =
            RoundRobinScheduler::new(config(&["node-a", "node-b"], Some(state_file), true));
        assert_eq!(scheduler.next_target().await, "node-a");
    }
}
