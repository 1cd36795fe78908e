//! The per-job processing pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parlance_asr::{
    AsrEngine, AudioDecoder, DecodeError, Language, SAMPLE_RATE, TranscribeOptions, Translator,
};
use parlance_data::{Job, JobStatus, JobStore, JobUpdate};
use parlance_gate::{GateResult, LanguageGate, truncate_to_words};
use parlance_telemetry::{MetricEvent, MetricsSender, TranslateDirection};
use serde_json::json;
use tracing::{error, info, warn};

/// Only the first N seconds of audio are transcribed for the snippet.
pub const SNIPPET_MAX_SECONDS: f64 = 15.0;

/// Number of whitespace-delimited tokens kept in the snippet.
pub const SNIPPET_MAX_WORDS: usize = 10;

/// Worker-pool tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of parallel workers.
    pub max_workers: usize,
    /// Failed attempts tolerated before a job goes terminal.
    pub max_retries: u32,
    /// Below this gate probability the snippet transcription enables VAD.
    pub lang_detect_min_prob: f64,
    /// Name of this node; labels the active-jobs gauge.
    pub owner_node: String,
}

/// Shared dependencies for the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct WorkerDeps {
    /// Persistent job store.
    pub store: JobStore,
    /// Audio decoder seam.
    pub decoder: Arc<dyn AudioDecoder>,
    /// ASR engine seam, shared across workers.
    pub engine: Arc<dyn AsrEngine>,
    /// Translator seam.
    pub translator: Arc<dyn Translator>,
    /// Language gate.
    pub gate: LanguageGate,
    /// Metric event channel.
    pub metrics: MetricsSender,
    /// Pool configuration.
    pub config: Arc<WorkerConfig>,
}

enum PipelineFailure {
    /// Not retryable; the job fails immediately.
    Terminal(String),
    /// Retryable up to `max_retries`.
    Transient(String),
}

/// Claim and process one job, returning its id when one was available.
///
/// Panics inside the pipeline are contained: the job is failed and the
/// caller's loop continues.
pub async fn process_next(deps: &WorkerDeps) -> Option<String> {
    let job = match deps.store.claim_next().await {
        Ok(Some(job)) => job,
        Ok(None) => return None,
        Err(err) => {
            error!(error = %err, "failed to claim next job");
            return None;
        }
    };

    let id = job.id.clone();
    info!(job_id = %id, "processing job");
    deps.metrics.emit(MetricEvent::JobStarted {
        owner: deps.config.owner_node.clone(),
    });

    let task_deps = deps.clone();
    let task_job = job.clone();
    let outcome = tokio::spawn(async move { run_pipeline(&task_deps, &task_job).await }).await;
    if outcome.is_err() {
        // The pipeline task panicked; fail the job instead of the pool.
        error!(job_id = %id, "pipeline task panicked");
        record_failure(
            deps,
            &job,
            &PipelineFailure::Transient("worker panicked while processing job".to_string()),
        )
        .await;
    }

    deps.metrics.emit(MetricEvent::JobFinished {
        owner: deps.config.owner_node.clone(),
    });
    Some(id)
}

async fn run_pipeline(deps: &WorkerDeps, job: &Job) {
    let started = Instant::now();
    match execute(deps, job, started).await {
        Ok(()) => {}
        Err(failure) => record_failure(deps, job, &failure).await,
    }
}

async fn execute(deps: &WorkerDeps, job: &Job, started: Instant) -> Result<(), PipelineFailure> {
    let audio = deps
        .decoder
        .decode(Path::new(&job.input_path))
        .await
        .map_err(|err| match err {
            DecodeError::InvalidAudio { .. } => {
                PipelineFailure::Terminal(format!("invalid_audio: {err}"))
            }
            other => PipelineFailure::Transient(other.to_string()),
        })?;

    #[allow(clippy::cast_precision_loss)]
    let audio_seconds = audio.len() as f64 / f64::from(SAMPLE_RATE);
    deps.metrics.emit(MetricEvent::AudioSeconds(audio_seconds));

    let gate_result = deps
        .gate
        .evaluate(&audio)
        .await
        .map_err(|err| PipelineFailure::Transient(err.to_string()))?;
    record_gate_path(deps, &gate_result);

    let mut result = if gate_result.music_only {
        // No speech: skip transcription and translation entirely.
        json!({
            "language": gate_result.language_label(),
            "probability": gate_result.probability,
            "text": "",
            "gate_decision": gate_result.gate_decision,
            "gate_meta": gate_result.gate_meta,
            "music_only": true,
            "detection_method": gate_result.method.as_str(),
            "translated": false,
            "raw": { "text": "", "info": {} },
        })
    } else {
        transcribe_snippet(deps, job, &audio, &gate_result).await?
    };

    deps.store
        .update(
            &job.id,
            &JobUpdate {
                progress: Some(90),
                ..JobUpdate::default()
            },
        )
        .await
        .map_err(|err| PipelineFailure::Transient(err.to_string()))?;

    let processing_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    result["processing_ms"] = json!(processing_ms);

    let result_json = result.to_string();
    deps.store
        .update(
            &job.id,
            &JobUpdate {
                status: Some(JobStatus::Succeeded),
                progress: Some(100),
                result_json: Some(result_json),
                ..JobUpdate::default()
            },
        )
        .await
        .map_err(|err| PipelineFailure::Transient(err.to_string()))?;

    info!(job_id = %job.id, "job succeeded");
    deps.metrics.emit(MetricEvent::JobCompleted {
        status: "succeeded",
    });
    let elapsed = (Utc::now() - job.created_at).num_milliseconds();
    #[allow(clippy::cast_precision_loss)]
    let elapsed_seconds = elapsed.max(0) as f64 / 1000.0;
    deps.metrics
        .emit(MetricEvent::ProcessingSeconds(elapsed_seconds));
    Ok(())
}

async fn transcribe_snippet(
    deps: &WorkerDeps,
    job: &Job,
    audio: &[f32],
    gate_result: &GateResult,
) -> Result<serde_json::Value, PipelineFailure> {
    // The gate always names a language on non-music paths.
    let language = gate_result.language.unwrap_or(Language::En);
    let probability = gate_result.probability.unwrap_or(0.0);
    let use_vad = probability < deps.config.lang_detect_min_prob;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let snippet_samples = (SNIPPET_MAX_SECONDS * f64::from(SAMPLE_RATE)) as usize;
    let snippet_audio = &audio[..audio.len().min(snippet_samples)];

    let transcription = deps
        .engine
        .transcribe(
            snippet_audio,
            TranscribeOptions {
                language: Some(language),
                vad_filter: use_vad,
                beam_size: 5,
                best_of: Some(5),
                suppress_blank: true,
            },
        )
        .await
        .map_err(|err| PipelineFailure::Transient(err.to_string()))?;

    let text = transcription.joined_text();
    let snippet = truncate_to_words(&text, SNIPPET_MAX_WORDS);

    // Keep only serializable engine metadata; drop verbose option dumps.
    let mut info = transcription.info.clone();
    info.extra.remove("transcription_options");
    let raw_info =
        serde_json::to_value(&info).map_err(|err| PipelineFailure::Transient(err.to_string()))?;

    let mut result = json!({
        "language": language.as_str(),
        "probability": gate_result.probability,
        "text": snippet,
        "gate_decision": gate_result.gate_decision,
        "gate_meta": gate_result.gate_meta,
        "music_only": false,
        "detection_method": gate_result.method.as_str(),
        "translated": false,
        "raw": { "text": snippet, "info": raw_info },
    });

    if let Some(target) = job.target_lang.as_deref()
        && target != language.as_str()
    {
        match target.parse::<Language>() {
            Ok(target_lang) => {
                let translated = deps
                    .translator
                    .translate(&text, language, target_lang)
                    .await
                    .map_err(|err| PipelineFailure::Transient(err.to_string()))?;
                result["translated"] = json!(true);
                result["result"] = json!(translated);
                result["target_lang"] = json!(target);
                let direction = match language {
                    Language::En => TranslateDirection::En2Fr,
                    Language::Fr => TranslateDirection::Fr2En,
                };
                deps.metrics.emit(MetricEvent::Translate(direction));
            }
            Err(err) => {
                // Ingress validates target languages; tolerate legacy rows.
                warn!(job_id = %job.id, error = %err, "skipping translation to unknown target");
            }
        }
    }

    Ok(result)
}

fn record_gate_path(deps: &WorkerDeps, gate_result: &GateResult) {
    deps.metrics.emit(MetricEvent::GatePath {
        gate_path: gate_result.gate_decision.gate_path(gate_result.music_only),
        gate_decision: gate_result.gate_decision.as_str().to_string(),
        pipeline_mode: gate_result
            .gate_decision
            .pipeline_mode(gate_result.music_only),
        language: gate_result.language_label().to_string(),
        music_only: gate_result.music_only,
    });
}

async fn record_failure(deps: &WorkerDeps, job: &Job, failure: &PipelineFailure) {
    let attempts = job.attempts + 1;
    let (message, status) = match failure {
        PipelineFailure::Terminal(message) => (message, JobStatus::Failed),
        PipelineFailure::Transient(message) => {
            let status = if attempts <= i64::from(deps.config.max_retries) {
                JobStatus::Queued
            } else {
                JobStatus::Failed
            };
            (message, status)
        }
    };
    warn!(job_id = %job.id, attempts, status = %status, error = %message, "job attempt failed");

    if let Err(err) = deps
        .store
        .update(
            &job.id,
            &JobUpdate {
                status: Some(status),
                attempts: Some(attempts),
                error: Some(message.clone()),
                ..JobUpdate::default()
            },
        )
        .await
    {
        error!(job_id = %job.id, error = %err, "failed to record job failure");
    }
    deps.metrics
        .emit(MetricEvent::JobCompleted { status: "failed" });
}
