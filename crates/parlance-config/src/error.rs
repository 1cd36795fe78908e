//! Configuration errors with field-level context.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidEnv {
        /// Environment variable name.
        name: &'static str,
        /// Raw value that failed to parse.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The cluster config file could not be read.
    #[error("failed to read cluster config at {path}")]
    ClusterFileRead {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The cluster config file was not valid JSON for the expected shape.
    #[error("failed to parse cluster config at {path}")]
    ClusterFileParse {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },
    /// `self_name` did not appear in the configured node map.
    #[error("self_name {self_name:?} not present in nodes {nodes:?}")]
    SelfNotInNodes {
        /// Declared name of this node.
        self_name: String,
        /// Names that were present in the node map.
        nodes: Vec<String>,
    },
}
