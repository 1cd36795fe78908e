//! Shared application state threaded through every handler.

use std::sync::Arc;

use parlance_asr::AudioDecoder;
use parlance_cluster::{HealthMonitor, ProxyClient, RoundRobinScheduler};
use parlance_config::{ClusterConfig, Settings};
use parlance_data::JobStore;
use parlance_gate::LanguageGate;
use parlance_telemetry::Metrics;

/// Dependencies shared by the HTTP handlers.
pub struct ApiState {
    /// Process settings.
    pub settings: Arc<Settings>,
    /// Cluster topology.
    pub cluster: Arc<ClusterConfig>,
    /// Persistent job store.
    pub store: JobStore,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Node-to-node relay client.
    pub proxy: ProxyClient,
    /// Round-robin upload scheduler.
    pub scheduler: Arc<RoundRobinScheduler>,
    /// Peer health table.
    pub health: HealthMonitor,
    /// Language gate used by the strict ingress validator.
    pub gate: LanguageGate,
    /// Audio decoder used by the strict ingress validator.
    pub decoder: Arc<dyn AudioDecoder>,
}

impl ApiState {
    /// Name of this node.
    #[must_use]
    pub fn self_name(&self) -> &str {
        &self.cluster.self_name
    }
}
