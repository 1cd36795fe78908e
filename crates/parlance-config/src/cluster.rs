//! Cluster topology configuration.
//!
//! The topology lives in a small JSON file pointed at by
//! `CLUSTER_CONFIG_FILE`. When the file is absent the node runs standalone,
//! with itself as the only member, so single-node deployments need no
//! configuration at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default interval between peer health probes, in seconds.
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 5;

/// Default timeout for node-to-node requests, in seconds.
pub const DEFAULT_INTERNAL_TIMEOUT_SECS: u64 = 5;

/// Node name used when no cluster file is configured.
const STANDALONE_NAME: &str = "standalone";

/// Cluster membership and node-to-node networking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Name of this node; must be a key of `nodes`.
    pub self_name: String,
    /// Map of node name to HTTP base URL, covering every cluster member.
    pub nodes: BTreeMap<String, String>,
    /// Seconds between peer health probes.
    #[serde(default = "default_health_interval")]
    pub health_check_interval_seconds: u64,
    /// Timeout in seconds for node-to-node requests.
    #[serde(default = "default_internal_timeout")]
    pub internal_request_timeout_seconds: u64,
    /// Whether uploads are distributed round-robin across the cluster.
    #[serde(default = "default_true")]
    pub enable_round_robin: bool,
    /// File the round-robin cursor is persisted to between restarts.
    #[serde(default)]
    pub rr_state_file: Option<PathBuf>,
}

const fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL_SECS
}

const fn default_internal_timeout() -> u64 {
    DEFAULT_INTERNAL_TIMEOUT_SECS
}

const fn default_true() -> bool {
    true
}

impl ClusterConfig {
    /// Load the topology from `CLUSTER_CONFIG_FILE`, falling back to a
    /// standalone single-node config when the variable is unset or the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing file cannot be read or parsed, or
    /// when `self_name` is missing from the node map.
    pub fn from_env(local_port: u16) -> Result<Self> {
        match std::env::var("CLUSTER_CONFIG_FILE") {
            Ok(path) if Path::new(&path).exists() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::standalone(local_port)),
        }
    }

    /// Load and validate the topology from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or when
    /// `self_name` is missing from the node map.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ClusterFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|source| ConfigError::ClusterFileParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Single-node topology used when no cluster file is configured.
    #[must_use]
    pub fn standalone(local_port: u16) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            STANDALONE_NAME.to_string(),
            format!("http://localhost:{local_port}"),
        );
        Self {
            self_name: STANDALONE_NAME.to_string(),
            nodes,
            health_check_interval_seconds: DEFAULT_HEALTH_INTERVAL_SECS,
            internal_request_timeout_seconds: DEFAULT_INTERNAL_TIMEOUT_SECS,
            enable_round_robin: true,
            rr_state_file: None,
        }
    }

    /// Check the topology invariants.
    ///
    /// # Errors
    ///
    /// Returns an error when `self_name` is not a member of `nodes`.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.contains_key(&self.self_name) {
            Ok(())
        } else {
            Err(ConfigError::SelfNotInNodes {
                self_name: self.self_name.clone(),
                nodes: self.nodes.keys().cloned().collect(),
            })
        }
    }

    /// Base URL for a node, if it is a known member.
    #[must_use]
    pub fn node_url(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).map(String::as_str)
    }

    /// Node names in sorted order, the order the round-robin cursor walks.
    #[must_use]
    pub fn sorted_node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Whether the given node name refers to this process.
    #[must_use]
    pub fn is_self(&self, name: &str) -> bool {
        name == self.self_name
    }
}
