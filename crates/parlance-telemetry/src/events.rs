//! Bounded delivery channel for worker-side metric events.
//!
//! Workers never touch the registry directly: they emit [`MetricEvent`]s into
//! a bounded mpsc channel and a single consumer task performs the counter
//! updates on the registry owned by the HTTP process. Emission never blocks;
//! when the channel is full the event is dropped and logged.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::metrics::Metrics;

/// Capacity of the metric event channel.
const CHANNEL_CAPACITY: usize = 1_024;

/// Direction of a snippet translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateDirection {
    /// English to French.
    En2Fr,
    /// French to English.
    Fr2En,
}

/// A metric update produced by a worker or the language gate.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    /// A worker task entered its claim loop.
    WorkerStarted,
    /// A worker task left its claim loop.
    WorkerStopped,
    /// A job moved into `running`.
    JobStarted {
        /// Owner node of the job.
        owner: String,
    },
    /// A running job reached any terminal disposition (including requeue).
    JobFinished {
        /// Owner node of the job.
        owner: String,
    },
    /// A job reached a terminal status.
    JobCompleted {
        /// Terminal status label (`succeeded` or `failed`).
        status: &'static str,
    },
    /// End-to-end processing latency for a succeeded job.
    ProcessingSeconds(f64),
    /// Input audio duration for a decoded job.
    AudioSeconds(f64),
    /// The gate accepted an autodetect result.
    AutodetectAccept,
    /// The gate rejected autodetection and moved on.
    AutodetectReject,
    /// The scoring fallback was used.
    FallbackUsed,
    /// A snippet translation ran in the given direction.
    Translate(TranslateDirection),
    /// A finalized gate decision with its classification labels.
    GatePath {
        /// Stable gate path label.
        gate_path: &'static str,
        /// Wire label of the gate decision.
        gate_decision: String,
        /// Coarse pipeline mode label.
        pipeline_mode: &'static str,
        /// Detected language label (`en`, `fr`, `none`, or `unknown`).
        language: String,
        /// Whether the probe was classified as music only.
        music_only: bool,
    },
}

/// Cheap, cloneable handle used to emit metric events.
#[derive(Clone)]
pub struct MetricsSender {
    tx: Option<mpsc::Sender<MetricEvent>>,
}

impl MetricsSender {
    /// Create the bounded channel and its sending handle.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<MetricEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that silently discards every event. Useful in tests that do
    /// not assert on metrics.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event without blocking. Full or closed channels drop the
    /// event; job processing must never stall on metrics delivery.
    pub fn emit(&self, event: MetricEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.try_send(event) {
            warn!(error = %err, "dropping metric event");
        }
    }
}

/// Spawn the consumer task that applies metric events to the registry.
#[must_use]
pub fn spawn_metric_consumer(
    metrics: Metrics,
    mut rx: mpsc::Receiver<MetricEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            apply_event(&metrics, event);
        }
    })
}

fn apply_event(metrics: &Metrics, event: MetricEvent) {
    match event {
        MetricEvent::WorkerStarted => metrics.inc_active_workers(),
        MetricEvent::WorkerStopped => metrics.dec_active_workers(),
        MetricEvent::JobStarted { owner } => {
            metrics.inc_jobs_running();
            metrics.inc_jobs_active(&owner);
        }
        MetricEvent::JobFinished { owner } => {
            metrics.dec_jobs_running();
            metrics.dec_jobs_active(&owner);
        }
        MetricEvent::JobCompleted { status } => metrics.inc_job_total(status),
        MetricEvent::ProcessingSeconds(seconds) => metrics.observe_processing_seconds(seconds),
        MetricEvent::AudioSeconds(seconds) => metrics.observe_audio_seconds(seconds),
        MetricEvent::AutodetectAccept => metrics.inc_autodetect_accept(),
        MetricEvent::AutodetectReject => metrics.inc_autodetect_reject(),
        MetricEvent::FallbackUsed => metrics.inc_fallback_used(),
        MetricEvent::Translate(TranslateDirection::En2Fr) => metrics.inc_translate_en2fr(),
        MetricEvent::Translate(TranslateDirection::Fr2En) => metrics.inc_translate_fr2en(),
        MetricEvent::GatePath {
            gate_path,
            gate_decision,
            pipeline_mode,
            language,
            music_only,
        } => {
            metrics.record_gate_path(
                gate_path,
                &gate_decision,
                pipeline_mode,
                &language,
                music_only,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumer_applies_events_to_registry() {
        let metrics = Metrics::new().expect("metrics");
        let (sender, rx) = MetricsSender::channel();
        let consumer = spawn_metric_consumer(metrics.clone(), rx);

        sender.emit(MetricEvent::JobStarted {
            owner: "node-a".to_string(),
        });
        sender.emit(MetricEvent::JobCompleted {
            status: "succeeded",
        });
        sender.emit(MetricEvent::ProcessingSeconds(3.0));
        sender.emit(MetricEvent::Translate(TranslateDirection::En2Fr));
        sender.emit(MetricEvent::GatePath {
            gate_path: "fallback",
            gate_decision: "fallback".to_string(),
            pipeline_mode: "FALLBACK",
            language: "en".to_string(),
            music_only: false,
        });
        drop(sender);
        consumer.await.expect("consumer exits");

        let (count, _) = metrics.processing_stats();
        assert_eq!(count, 1);
        let stats = metrics.gate_path_stats();
        assert_eq!(stats.total, 1);
        assert!(stats.paths.contains_key("fallback"));
        let local = metrics.local_metrics();
        assert_eq!(local.jobs_active.get("node-a"), Some(&1));
    }

    #[test]
    fn disabled_sender_swallows_events() {
        let sender = MetricsSender::disabled();
        sender.emit(MetricEvent::AutodetectAccept);
    }
}
