//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Keeps in-memory mirrors of the cluster-facing series so the
//!   `/cluster/local-metrics` and gate-path endpoints can serve structured
//!   JSON without parsing the exposition format back.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use serde::Serialize;

/// Buckets for the end-to-end processing latency histogram, in seconds.
const PROCESSING_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];

/// Buckets for the input audio duration histogram, in seconds.
const AUDIO_BUCKETS: &[f64] = &[1.0, 3.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0, 1800.0];

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    jobs_total: IntCounterVec,
    jobs_running: IntGauge,
    active_workers: IntGauge,
    processing_seconds: Histogram,
    audio_seconds: Histogram,
    autodetect_accept: IntCounter,
    autodetect_reject: IntCounter,
    fallback_used: IntCounter,
    translate_en2fr: IntCounter,
    translate_fr2en: IntCounter,
    gate_path_decisions: IntCounterVec,
    jobs_submitted: IntCounterVec,
    jobs_owned: IntCounterVec,
    jobs_active: IntGaugeVec,
    node_up: IntGaugeVec,
    node_last_health: GaugeVec,
    mirrors: Mutex<Mirrors>,
}

#[derive(Default)]
struct Mirrors {
    gate_paths: BTreeMap<String, u64>,
    jobs_submitted: BTreeMap<String, u64>,
    jobs_owned: BTreeMap<String, u64>,
    jobs_active: BTreeMap<String, i64>,
    node_up: BTreeMap<String, bool>,
    node_last_health: BTreeMap<String, f64>,
}

/// Raw local metric state served to peers for cluster aggregation.
///
/// Composite `jobs_submitted` keys are `"<ingress>,<target>"`.
#[derive(Debug, Clone, Serialize, serde::Deserialize, Default)]
pub struct LocalMetrics {
    /// Jobs submitted through this ingress, keyed by `"<ingress>,<target>"`.
    pub jobs_submitted: BTreeMap<String, u64>,
    /// Jobs created locally, keyed by owner node.
    pub jobs_owned: BTreeMap<String, u64>,
    /// Currently running jobs, keyed by owner node.
    pub jobs_active: BTreeMap<String, i64>,
    /// Peer reachability as seen by this node.
    pub node_up: BTreeMap<String, bool>,
    /// Unix timestamp of the last successful health probe per peer.
    pub node_last_health: BTreeMap<String, f64>,
}

/// Distribution of gate-path decisions with percentages.
#[derive(Debug, Clone, Serialize)]
pub struct GatePathStats {
    /// Total decisions recorded.
    pub total: u64,
    /// Per-path counts and percentage share.
    pub paths: BTreeMap<String, GatePathEntry>,
}

/// One gate path's share of the recorded decisions.
#[derive(Debug, Clone, Serialize)]
pub struct GatePathEntry {
    /// Number of decisions that took this path.
    pub count: u64,
    /// Share of the total, 0–100.
    pub percent: f64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("langid_jobs_total", "Jobs processed by terminal status"),
            &["status"],
        )?;
        let jobs_running = IntGauge::with_opts(Opts::new(
            "langid_jobs_running",
            "Number of jobs currently running",
        ))?;
        let active_workers = IntGauge::with_opts(Opts::new(
            "langid_active_workers",
            "Number of active worker tasks",
        ))?;
        let processing_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "langid_processing_seconds",
                "End-to-end processing latency per job",
            )
            .buckets(PROCESSING_BUCKETS.to_vec()),
        )?;
        let audio_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "langid_audio_seconds",
                "Input audio duration per job (seconds)",
            )
            .buckets(AUDIO_BUCKETS.to_vec()),
        )?;
        let autodetect_accept = IntCounter::with_opts(Opts::new(
            "langid_autodetect_accept",
            "Language detections that passed the gate",
        ))?;
        let autodetect_reject = IntCounter::with_opts(Opts::new(
            "langid_autodetect_reject",
            "Language detections rejected or sent to fallback",
        ))?;
        let fallback_used = IntCounter::with_opts(Opts::new(
            "langid_fallback_used",
            "Times the EN/FR scoring fallback was used",
        ))?;
        let translate_en2fr = IntCounter::with_opts(Opts::new(
            "langid_translate_direction_en2fr",
            "Translations from English to French",
        ))?;
        let translate_fr2en = IntCounter::with_opts(Opts::new(
            "langid_translate_direction_fr2en",
            "Translations from French to English",
        ))?;
        let gate_path_decisions = IntCounterVec::new(
            Opts::new(
                "langid_gate_path_decisions_total",
                "Finalized language-gate decisions by path",
            ),
            &[
                "gate_path",
                "gate_decision",
                "pipeline_mode",
                "language",
                "music_only",
            ],
        )?;
        let jobs_submitted = IntCounterVec::new(
            Opts::new(
                "langid_jobs_submitted_total",
                "Jobs submitted via POST /jobs",
            ),
            &["ingress_node", "target_node"],
        )?;
        let jobs_owned = IntCounterVec::new(
            Opts::new("langid_jobs_owned_total", "Jobs created locally"),
            &["owner_node"],
        )?;
        let jobs_active = IntGaugeVec::new(
            Opts::new("langid_jobs_active", "Currently active jobs"),
            &["owner_node"],
        )?;
        let node_up = IntGaugeVec::new(
            Opts::new("langid_node_up", "Node up status (1=up, 0=down)"),
            &["node"],
        )?;
        let node_last_health = GaugeVec::new(
            Opts::new(
                "langid_node_last_health_timestamp_seconds",
                "Timestamp of the last successful health check",
            ),
            &["node"],
        )?;

        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(jobs_running.clone()))?;
        registry.register(Box::new(active_workers.clone()))?;
        registry.register(Box::new(processing_seconds.clone()))?;
        registry.register(Box::new(audio_seconds.clone()))?;
        registry.register(Box::new(autodetect_accept.clone()))?;
        registry.register(Box::new(autodetect_reject.clone()))?;
        registry.register(Box::new(fallback_used.clone()))?;
        registry.register(Box::new(translate_en2fr.clone()))?;
        registry.register(Box::new(translate_fr2en.clone()))?;
        registry.register(Box::new(gate_path_decisions.clone()))?;
        registry.register(Box::new(jobs_submitted.clone()))?;
        registry.register(Box::new(jobs_owned.clone()))?;
        registry.register(Box::new(jobs_active.clone()))?;
        registry.register(Box::new(node_up.clone()))?;
        registry.register(Box::new(node_last_health.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                jobs_total,
                jobs_running,
                active_workers,
                processing_seconds,
                audio_seconds,
                autodetect_accept,
                autodetect_reject,
                fallback_used,
                translate_en2fr,
                translate_fr2en,
                gate_path_decisions,
                jobs_submitted,
                jobs_owned,
                jobs_active,
                node_up,
                node_last_health,
                mirrors: Mutex::new(Mirrors::default()),
            }),
        })
    }

    /// Increment the terminal-status job counter.
    pub fn inc_job_total(&self, status: &str) {
        self.inner.jobs_total.with_label_values(&[status]).inc();
    }

    /// Increment the running-jobs gauge.
    pub fn inc_jobs_running(&self) {
        self.inner.jobs_running.inc();
    }

    /// Decrement the running-jobs gauge.
    pub fn dec_jobs_running(&self) {
        self.inner.jobs_running.dec();
    }

    /// Increment the active-workers gauge.
    pub fn inc_active_workers(&self) {
        self.inner.active_workers.inc();
    }

    /// Decrement the active-workers gauge.
    pub fn dec_active_workers(&self) {
        self.inner.active_workers.dec();
    }

    /// Observe one job's end-to-end processing latency.
    pub fn observe_processing_seconds(&self, seconds: f64) {
        self.inner.processing_seconds.observe(seconds);
    }

    /// Observe one job's input audio duration.
    pub fn observe_audio_seconds(&self, seconds: f64) {
        self.inner.audio_seconds.observe(seconds);
    }

    /// Sample count and sum of the processing latency histogram.
    #[must_use]
    pub fn processing_stats(&self) -> (u64, f64) {
        let histogram = &self.inner.processing_seconds;
        (histogram.get_sample_count(), histogram.get_sample_sum())
    }

    /// Record a detection that passed the gate.
    pub fn inc_autodetect_accept(&self) {
        self.inner.autodetect_accept.inc();
    }

    /// Record a detection that was rejected or fell through to the fallback.
    pub fn inc_autodetect_reject(&self) {
        self.inner.autodetect_reject.inc();
    }

    /// Record a use of the EN/FR scoring fallback.
    pub fn inc_fallback_used(&self) {
        self.inner.fallback_used.inc();
    }

    /// Record an English-to-French translation.
    pub fn inc_translate_en2fr(&self) {
        self.inner.translate_en2fr.inc();
    }

    /// Record a French-to-English translation.
    pub fn inc_translate_fr2en(&self) {
        self.inner.translate_fr2en.inc();
    }

    /// Record a finalized gate decision under its classification labels.
    pub fn record_gate_path(
        &self,
        gate_path: &str,
        gate_decision: &str,
        pipeline_mode: &str,
        language: &str,
        music_only: bool,
    ) {
        let music_only_label = if music_only { "true" } else { "false" };
        self.inner
            .gate_path_decisions
            .with_label_values(&[
                gate_path,
                gate_decision,
                pipeline_mode,
                language,
                music_only_label,
            ])
            .inc();
        let mut mirrors = self.lock_mirrors();
        *mirrors.gate_paths.entry(gate_path.to_string()).or_insert(0) += 1;
    }

    /// Record a job submission routed from `ingress` to `target`.
    pub fn inc_jobs_submitted(&self, ingress: &str, target: &str) {
        self.inner
            .jobs_submitted
            .with_label_values(&[ingress, target])
            .inc();
        let mut mirrors = self.lock_mirrors();
        *mirrors
            .jobs_submitted
            .entry(format!("{ingress},{target}"))
            .or_insert(0) += 1;
    }

    /// Record a job created and owned locally.
    pub fn inc_jobs_owned(&self, owner: &str) {
        self.inner.jobs_owned.with_label_values(&[owner]).inc();
        let mut mirrors = self.lock_mirrors();
        *mirrors.jobs_owned.entry(owner.to_string()).or_insert(0) += 1;
    }

    /// Increment the active-jobs gauge for an owner node.
    pub fn inc_jobs_active(&self, owner: &str) {
        self.inner.jobs_active.with_label_values(&[owner]).inc();
        let mut mirrors = self.lock_mirrors();
        *mirrors.jobs_active.entry(owner.to_string()).or_insert(0) += 1;
    }

    /// Decrement the active-jobs gauge for an owner node, floored at zero.
    pub fn dec_jobs_active(&self, owner: &str) {
        self.inner.jobs_active.with_label_values(&[owner]).dec();
        let mut mirrors = self.lock_mirrors();
        let entry = mirrors.jobs_active.entry(owner.to_string()).or_insert(0);
        if *entry > 0 {
            *entry -= 1;
        }
    }

    /// Record a peer's up/down status.
    pub fn set_node_up(&self, node: &str, up: bool) {
        self.inner
            .node_up
            .with_label_values(&[node])
            .set(i64::from(up));
        let mut mirrors = self.lock_mirrors();
        mirrors.node_up.insert(node.to_string(), up);
    }

    /// Record the timestamp of a peer's last successful health probe.
    pub fn set_node_last_health(&self, node: &str, timestamp: f64) {
        self.inner
            .node_last_health
            .with_label_values(&[node])
            .set(timestamp);
        let mut mirrors = self.lock_mirrors();
        mirrors.node_last_health.insert(node.to_string(), timestamp);
    }

    /// Snapshot of the cluster-facing series for peer aggregation.
    #[must_use]
    pub fn local_metrics(&self) -> LocalMetrics {
        let mirrors = self.lock_mirrors();
        LocalMetrics {
            jobs_submitted: mirrors.jobs_submitted.clone(),
            jobs_owned: mirrors.jobs_owned.clone(),
            jobs_active: mirrors.jobs_active.clone(),
            node_up: mirrors.node_up.clone(),
            node_last_health: mirrors.node_last_health.clone(),
        }
    }

    /// Gate-path distribution with percentage shares.
    #[must_use]
    pub fn gate_path_stats(&self) -> GatePathStats {
        let mirrors = self.lock_mirrors();
        let total: u64 = mirrors.gate_paths.values().sum();
        let paths = mirrors
            .gate_paths
            .iter()
            .map(|(path, count)| {
                let percent = if total == 0 {
                    0.0
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let share = (*count as f64) / (total as f64) * 100.0;
                    share
                };
                (
                    path.clone(),
                    GatePathEntry {
                        count: *count,
                        percent,
                    },
                )
            })
            .collect();
        GatePathStats { total, paths }
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    fn lock_mirrors(&self) -> MutexGuard<'_, Mirrors> {
        self.inner.mirrors.lock().unwrap_or_else(|poisoned| {
            tracing::error!("metrics mirror mutex poisoned; continuing with recovered guard");
            poisoned.into_inner()
        })
    }
}
