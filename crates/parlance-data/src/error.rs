//! Data-layer errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the job store.
#[derive(Debug, Error)]
pub enum DataError {
    /// A database operation failed.
    #[error("database operation failed: {operation}")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying sqlx error.
        source: sqlx::Error,
    },
    /// Schema migrations failed to apply.
    #[error("failed to run job store migrations")]
    Migrate {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A persisted status label was not a member of the automaton.
    #[error("unknown job status {value:?} for job {id}")]
    UnknownStatus {
        /// Job identifier carrying the bad label.
        id: String,
        /// The label that failed to parse.
        value: String,
    },
    /// An artifact removal failed.
    #[error("failed to remove artifact at {path}")]
    ArtifactIo {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

impl DataError {
    pub(crate) const fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }
}
