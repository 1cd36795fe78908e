#![forbid(unsafe_code)]

//! Telemetry for the Parlance service: tracing setup, the Prometheus-backed
//! metrics registry, and the bounded channel workers use to deliver metric
//! events to the process that owns the registry.

pub mod events;
pub mod init;
pub mod metrics;

pub use events::{MetricEvent, MetricsSender, TranslateDirection, spawn_metric_consumer};
pub use init::{LogFormat, LoggingConfig, init_logging};
pub use metrics::{GatePathEntry, GatePathStats, LocalMetrics, Metrics};
