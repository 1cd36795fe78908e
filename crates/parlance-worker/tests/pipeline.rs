//! End-to-end pipeline tests over scripted speech-stack fakes.

use std::sync::Arc;
use std::time::Duration;

use parlance_data::{JobStatus, JobStore, NewJob};
use parlance_gate::{GateConfig, LanguageGate};
use parlance_telemetry::MetricsSender;
use parlance_test_support::{
    FailingDecoder, RecordingTranslator, ScriptedEngine, StaticDecoder, temp_job_store,
    transcription,
};
use parlance_worker::{WorkerConfig, WorkerDeps, WorkerPool, process_next};
use tokio::sync::watch;

fn deps_with(
    store: JobStore,
    engine: Arc<ScriptedEngine>,
    decoder: Arc<dyn parlance_asr::AudioDecoder>,
    translator: Arc<RecordingTranslator>,
) -> WorkerDeps {
    let gate = LanguageGate::new(
        engine.clone(),
        GateConfig::default(),
        MetricsSender::disabled(),
    );
    WorkerDeps {
        store,
        decoder,
        engine,
        translator,
        gate,
        metrics: MetricsSender::disabled(),
        config: Arc::new(WorkerConfig {
            max_workers: 1,
            max_retries: 2,
            lang_detect_min_prob: 0.60,
            owner_node: "node-a".to_string(),
        }),
    }
}

async fn enqueue(store: &JobStore, id: &str, target_lang: Option<&str>) {
    store
        .create(&NewJob {
            id: id.to_string(),
            input_path: format!("storage/{id}.wav"),
            original_filename: Some("clip.wav".to_string()),
            target_lang: target_lang.map(ToString::to_string),
        })
        .await
        .expect("create job");
}

#[tokio::test]
async fn high_confidence_english_job_succeeds_with_snippet() {
    let (_dir, store) = temp_job_store().await;
    enqueue(&store, "node-a-1", None).await;

    let engine = Arc::new(ScriptedEngine::new(vec![
        transcription(
            "the quick brown fox jumps over the lazy dog today",
            Some("en"),
            Some(0.92),
        ),
        transcription(
            "the quick brown fox jumps over the lazy dog today and still keeps going",
            Some("en"),
            Some(0.92),
        ),
    ]));
    let deps = deps_with(
        store.clone(),
        engine.clone(),
        Arc::new(StaticDecoder::silence(20.0)),
        Arc::new(RecordingTranslator::default()),
    );

    let claimed = process_next(&deps).await;
    assert_eq!(claimed.as_deref(), Some("node-a-1"));

    let job = store.get("node-a-1").await.expect("get").expect("job");
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress, 100);

    let result: serde_json::Value =
        serde_json::from_str(job.result_json.as_deref().expect("result json")).expect("parse");
    assert_eq!(result["language"], "en");
    assert_eq!(result["gate_decision"], "accepted_high_conf");
    assert_eq!(result["music_only"], false);
    assert_eq!(result["detection_method"], "autodetect");
    assert_eq!(
        result["text"],
        "the quick brown fox jumps over the lazy dog today"
    );
    assert_eq!(result["translated"], false);
    assert!(result["processing_ms"].is_u64());
    assert_eq!(result["gate_meta"]["vad_used"], false);

    // Probe + snippet transcription; probe probability was high so the
    // snippet pass runs without VAD.
    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[1].vad_filter);
    assert_eq!(calls[1].beam_size, 5);
}

#[tokio::test]
async fn music_only_job_skips_transcription_and_translation() {
    let (_dir, store) = temp_job_store().await;
    enqueue(&store, "node-a-1", Some("fr")).await;

    let engine = Arc::new(ScriptedEngine::new(vec![transcription(
        "[♪ soft background music ♪]",
        Some("en"),
        Some(0.95),
    )]));
    let translator = Arc::new(RecordingTranslator::default());
    let deps = deps_with(
        store.clone(),
        engine.clone(),
        Arc::new(StaticDecoder::silence(5.0)),
        translator.clone(),
    );

    process_next(&deps).await.expect("claimed");

    let job = store.get("node-a-1").await.expect("get").expect("job");
    assert_eq!(job.status, JobStatus::Succeeded);
    let result: serde_json::Value =
        serde_json::from_str(job.result_json.as_deref().expect("result json")).expect("parse");
    assert_eq!(result["language"], "none");
    assert_eq!(result["gate_decision"], "NO_SPEECH_MUSIC_ONLY");
    assert_eq!(result["music_only"], true);
    assert_eq!(engine.call_count(), 1, "no snippet transcription");
    assert!(translator.calls().is_empty(), "no translation");
}

#[tokio::test]
async fn invalid_audio_fails_without_retry() {
    let (_dir, store) = temp_job_store().await;
    enqueue(&store, "node-a-1", None).await;

    let deps = deps_with(
        store.clone(),
        Arc::new(ScriptedEngine::default()),
        Arc::new(FailingDecoder),
        Arc::new(RecordingTranslator::default()),
    );

    process_next(&deps).await.expect("claimed");

    let job = store.get("node-a-1").await.expect("get").expect("job");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.error.expect("error").contains("invalid_audio"));
    assert!(job.result_json.is_none());

    assert!(
        process_next(&deps).await.is_none(),
        "terminal job must not be requeued"
    );
}

#[tokio::test]
async fn transient_failures_requeue_until_retries_exhaust() {
    let (_dir, store) = temp_job_store().await;
    enqueue(&store, "node-a-1", None).await;

    // The scripted engine is empty, so every gate probe errors.
    let deps = deps_with(
        store.clone(),
        Arc::new(ScriptedEngine::default()),
        Arc::new(StaticDecoder::silence(5.0)),
        Arc::new(RecordingTranslator::default()),
    );

    for expected_attempts in 1..=2 {
        process_next(&deps).await.expect("claimed");
        let job = store.get("node-a-1").await.expect("get").expect("job");
        assert_eq!(job.status, JobStatus::Queued, "retry {expected_attempts}");
        assert_eq!(job.attempts, expected_attempts);
    }

    process_next(&deps).await.expect("claimed");
    let job = store.get("node-a-1").await.expect("get").expect("job");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
}

#[tokio::test]
async fn target_language_triggers_translation_of_full_text() {
    let (_dir, store) = temp_job_store().await;
    enqueue(&store, "node-a-1", Some("fr")).await;

    let engine = Arc::new(ScriptedEngine::new(vec![
        transcription(
            "the quick brown fox jumps over the lazy dog today",
            Some("en"),
            Some(0.92),
        ),
        transcription(
            "the quick brown fox jumps over the lazy dog today and still keeps going",
            Some("en"),
            Some(0.92),
        ),
    ]));
    let translator = Arc::new(RecordingTranslator::default());
    let deps = deps_with(
        store.clone(),
        engine,
        Arc::new(StaticDecoder::silence(20.0)),
        translator.clone(),
    );

    process_next(&deps).await.expect("claimed");

    let job = store.get("node-a-1").await.expect("get").expect("job");
    let result: serde_json::Value =
        serde_json::from_str(job.result_json.as_deref().expect("result json")).expect("parse");
    assert_eq!(result["translated"], true);
    assert_eq!(result["target_lang"], "fr");
    assert!(
        result["result"]
            .as_str()
            .expect("translated text")
            .starts_with("[fr]")
    );

    let calls = translator.calls();
    assert_eq!(calls.len(), 1);
    // The full concatenated text is translated, not just the snippet.
    assert!(calls[0].0.contains("still keeps going"));
}

#[tokio::test]
async fn pool_drains_queue_and_stops_on_shutdown() {
    let (_dir, store) = temp_job_store().await;
    enqueue(&store, "node-a-1", None).await;
    enqueue(&store, "node-a-2", None).await;

    let engine = Arc::new(ScriptedEngine::new(vec![
        transcription("the cat is on the mat again today you know", Some("en"), Some(0.92)),
        transcription("the cat is on the mat", Some("en"), Some(0.92)),
        transcription("the dog is in the yard again today you know", Some("en"), Some(0.92)),
        transcription("the dog is in the yard", Some("en"), Some(0.92)),
    ]));
    let deps = deps_with(
        store.clone(),
        engine,
        Arc::new(StaticDecoder::silence(5.0)),
        Arc::new(RecordingTranslator::default()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::spawn(deps, shutdown_rx);

    // Wait for both jobs to reach a terminal state.
    for _ in 0..100 {
        let jobs = store
            .list(&parlance_data::JobFilter::default())
            .await
            .expect("list");
        if jobs.iter().all(|job| job.status == JobStatus::Succeeded) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.send(true).expect("signal shutdown");
    tokio::time::timeout(Duration::from_secs(2), pool.join(Duration::from_secs(1)))
        .await
        .expect("pool joins promptly");

    let jobs = store
        .list(&parlance_data::JobFilter::default())
        .await
        .expect("list");
    assert!(jobs.iter().all(|job| job.status == JobStatus::Succeeded));
}
