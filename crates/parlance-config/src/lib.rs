#![forbid(unsafe_code)]

//! Process-wide configuration for the Parlance service.
//!
//! Two sources feed the running process: environment variables (worker
//! counts, storage locations, upload limits, language-gate thresholds) and an
//! optional JSON cluster topology file. Both are loaded once at startup and
//! are read-only afterwards.

pub mod cluster;
pub mod error;
pub mod settings;

pub use cluster::{ClusterConfig, DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_INTERNAL_TIMEOUT_SECS};
pub use error::{ConfigError, Result};
pub use settings::{GateThresholds, Settings};
