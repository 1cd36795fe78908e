//! # Design
//!
//! - Centralize application-level errors for bootstrap and maintenance.
//! - Keep error messages constant while carrying context fields for
//!   debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: parlance_config::ConfigError,
    },
    /// Store operations failed.
    #[error("store operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: parlance_data::DataError,
    },
    /// Cluster plumbing failed.
    #[error("cluster operation failed")]
    Cluster {
        /// Operation identifier.
        operation: &'static str,
        /// Source cluster error.
        source: parlance_cluster::ClusterError,
    },
    /// Telemetry setup or the API server failed.
    #[error("{operation} failed")]
    Runtime {
        /// Operation identifier.
        operation: &'static str,
        /// Source error.
        source: anyhow::Error,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: parlance_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: parlance_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn cluster(
        operation: &'static str,
        source: parlance_cluster::ClusterError,
    ) -> Self {
        Self::Cluster { operation, source }
    }

    pub(crate) fn runtime(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Runtime { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "settings.from_env",
            parlance_config::ConfigError::InvalidEnv {
                name: "MAX_WORKERS",
                value: "many".to_string(),
                reason: "unparseable",
            },
        );
        assert!(matches!(
            config,
            AppError::Config {
                operation: "settings.from_env",
                ..
            }
        ));

        let data = AppError::data(
            "store.connect",
            parlance_data::DataError::UnknownStatus {
                id: "node-a-1".to_string(),
                value: "paused".to_string(),
            },
        );
        assert!(matches!(
            data,
            AppError::Data {
                operation: "store.connect",
                ..
            }
        ));

        let cluster = AppError::cluster(
            "proxy.new",
            parlance_cluster::ClusterError::UnknownOwner {
                owner: "ghost".to_string(),
            },
        );
        assert!(matches!(
            cluster,
            AppError::Cluster {
                operation: "proxy.new",
                ..
            }
        ));

        let runtime = AppError::runtime("telemetry.init", anyhow::anyhow!("subscriber in use"));
        assert!(matches!(
            runtime,
            AppError::Runtime {
                operation: "telemetry.init",
                ..
            }
        ));
    }
}
