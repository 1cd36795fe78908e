//! Application bootstrap wiring.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parlance_api::{ApiServer, ApiState};
use parlance_asr::{AsrEngine, AudioDecoder, Translator};
use parlance_cluster::{HealthMonitor, ProxyClient, RoundRobinScheduler};
use parlance_config::{ClusterConfig, Settings};
use parlance_data::JobStore;
use parlance_gate::{GateConfig, LanguageGate};
use parlance_telemetry::{LoggingConfig, Metrics, MetricsSender, spawn_metric_consumer};
use parlance_worker::{WorkerConfig, WorkerDeps, WorkerPool};
use tokio::sync::watch;
use tracing::info;

use crate::adapters::{UnboundDecoder, UnboundEngine, UnboundTranslator};
use crate::error::{AppError, AppResult};

/// Speech-stack adapters injected into the pipeline. Deployments replace the
/// placeholders with real model integrations.
pub struct SpeechStack {
    /// ASR engine shared by the gate and the snippet transcription.
    pub engine: Arc<dyn AsrEngine>,
    /// Audio decoder.
    pub decoder: Arc<dyn AudioDecoder>,
    /// EN↔FR translator.
    pub translator: Arc<dyn Translator>,
}

impl Default for SpeechStack {
    fn default() -> Self {
        Self {
            engine: Arc::new(UnboundEngine),
            decoder: Arc::new(UnboundDecoder),
            translator: Arc::new(UnboundTranslator),
        }
    }
}

/// Map the process settings onto the gate thresholds.
#[must_use]
pub fn gate_config(settings: &Settings) -> GateConfig {
    GateConfig {
        allowed_langs: settings.allowed_langs.clone(),
        lang_detect_min_prob: settings.lang_detect_min_prob,
        strict_reject: settings.enfr_strict_reject,
        mid_lower: settings.gate.mid_lower,
        mid_upper: settings.gate.mid_upper,
        min_stopword_en: settings.gate.min_stopword_en,
        min_stopword_fr: settings.gate.min_stopword_fr,
        stopword_margin: settings.gate.stopword_margin,
        min_tokens_heuristic: settings.gate.min_tokens_heuristic,
        min_tokens_speech: settings.gate.min_tokens_speech,
        min_stopword_speech: settings.gate.min_stopword_speech,
    }
}

/// Entry point for the service boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, persistence, or the HTTP listener
/// cannot be brought up.
pub async fn run_app() -> AppResult<()> {
    let settings =
        Arc::new(Settings::from_env().map_err(|err| AppError::config("settings.from_env", err))?);
    run_app_with(settings, SpeechStack::default()).await
}

/// Boot sequence over injected dependencies, used directly by tests.
///
/// # Errors
///
/// Returns an error if configuration, persistence, or the HTTP listener
/// cannot be brought up.
pub async fn run_app_with(settings: Arc<Settings>, speech: SpeechStack) -> AppResult<()> {
    parlance_telemetry::init_logging(&LoggingConfig {
        level: &settings.log_level,
        format: parlance_telemetry::LogFormat::infer(),
    })
    .map_err(|err| AppError::runtime("telemetry.init", err))?;

    settings.ensure_dirs().map_err(|err| AppError::Io {
        operation: "settings.ensure_dirs",
        path: Some(settings.storage_dir.clone()),
        source: err,
    })?;

    let cluster = Arc::new(
        ClusterConfig::from_env(settings.http_port)
            .map_err(|err| AppError::config("cluster.from_env", err))?,
    );
    info!(
        node = %cluster.self_name,
        peers = cluster.nodes.len(),
        "parlance bootstrap starting"
    );

    let metrics =
        Metrics::new().map_err(|err| AppError::runtime("telemetry.metrics", err))?;
    let (metrics_tx, metrics_rx) = MetricsSender::channel();
    let metric_consumer = spawn_metric_consumer(metrics.clone(), metrics_rx);

    let store = JobStore::connect(&settings.db_url)
        .await
        .map_err(|err| AppError::data("store.connect", err))?;

    let gate = LanguageGate::new(
        speech.engine.clone(),
        gate_config(&settings),
        metrics_tx.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_deps = WorkerDeps {
        store: store.clone(),
        decoder: speech.decoder.clone(),
        engine: speech.engine,
        translator: speech.translator,
        gate: gate.clone(),
        metrics: metrics_tx.clone(),
        config: Arc::new(WorkerConfig {
            max_workers: settings.max_workers,
            max_retries: settings.max_retries,
            lang_detect_min_prob: settings.lang_detect_min_prob,
            owner_node: cluster.self_name.clone(),
        }),
    };
    let pool = WorkerPool::spawn(worker_deps, shutdown_rx.clone());
    info!(workers = settings.max_workers, "worker pool started");

    let proxy =
        ProxyClient::new(cluster.clone()).map_err(|err| AppError::cluster("proxy.new", err))?;
    let health = HealthMonitor::new(cluster.clone(), proxy.http().clone(), metrics.clone());
    let health_task = health.clone().run(shutdown_rx.clone());

    let state = Arc::new(ApiState {
        settings: settings.clone(),
        cluster: cluster.clone(),
        store,
        metrics,
        proxy,
        scheduler: Arc::new(RoundRobinScheduler::new(cluster)),
        health,
        gate,
        decoder: speech.decoder,
    });

    let addr = SocketAddr::new(settings.bind_addr, settings.http_port);
    let server = ApiServer::new(state);

    // Ctrl-c flips the shutdown flag; the server drains and the workers
    // finish their current job within the grace period.
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = signal_tx.send(true);
        }
    });

    let serve_shutdown = {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.changed().await;
        }
    };
    let serve_result = server.serve(addr, serve_shutdown).await;

    let _ = shutdown_tx.send(true);
    pool.join(Duration::from_secs(settings.shutdown_grace_secs)).await;
    let _ = health_task.await;
    drop(metrics_tx);
    metric_consumer.abort();

    serve_result.map_err(|err| AppError::runtime("api_server.serve", err))?;
    info!("shutdown complete");
    Ok(())
}
