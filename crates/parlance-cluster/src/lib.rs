#![forbid(unsafe_code)]

//! Cluster plumbing: round-robin dispatch, job-owner routing, peer health
//! polling, and cluster-wide aggregation.
//!
//! Ownership is fixed at job creation and encoded in the job identifier; the
//! helpers here parse it back out and proxy owner-bound operations to the
//! right node, degrading gracefully when peers are unreachable.

pub mod aggregate;
pub mod error;
pub mod health;
pub mod owner;
pub mod proxy;
pub mod scheduler;

pub use aggregate::{
    ClusterJobs, MetricsSummary, NodeJobsSummary, NodeMetricsSummary, aggregate_cluster_jobs,
    aggregate_metrics_summary,
};
pub use error::ClusterError;
pub use health::{HealthMonitor, NodeHealthView, NodeStatus};
pub use owner::{is_local, parse_job_owner};
pub use proxy::{PeerResponse, ProxyClient};
pub use scheduler::RoundRobinScheduler;
