//! Cluster-layer errors.

use thiserror::Error;

/// Errors raised by the cluster layer.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The HTTP client could not be constructed.
    #[error("failed to build cluster HTTP client")]
    ClientBuild {
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The job id prefix names a node that is not in the topology.
    #[error("unknown owner node {owner:?}")]
    UnknownOwner {
        /// Owner parsed from the job id.
        owner: String,
    },
    /// The owner node could not be reached before the cluster timeout.
    #[error("owner node {owner:?} unreachable")]
    Unreachable {
        /// Owner the request was destined for.
        owner: String,
    },
    /// A job id did not carry an `<owner>-<suffix>` shape.
    #[error("invalid job id {job_id:?}: expected <owner>-<suffix>")]
    InvalidJobId {
        /// The malformed id.
        job_id: String,
    },
}
