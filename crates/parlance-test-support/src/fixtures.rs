//! Builders and fixtures shared across test suites.

use parlance_asr::{Segment, Transcription, TranscriptionInfo};
use parlance_data::JobStore;

/// Single-segment transcription with the given detection outcome.
#[must_use]
pub fn transcription(text: &str, language: Option<&str>, probability: Option<f64>) -> Transcription {
    Transcription {
        segments: vec![Segment {
            text: text.to_string(),
            avg_logprob: Some(-0.25),
        }],
        info: TranscriptionInfo {
            language: language.map(ToString::to_string),
            language_probability: probability,
            duration: None,
            extra: std::collections::BTreeMap::new(),
        },
    }
}

/// Transcription whose segments carry specific average log probabilities,
/// for scripting the scoring fallback.
#[must_use]
pub fn transcription_with_logprobs(
    language: Option<&str>,
    segments: &[(&str, f64)],
) -> Transcription {
    Transcription {
        segments: segments
            .iter()
            .map(|(text, logprob)| Segment {
                text: (*text).to_string(),
                avg_logprob: Some(*logprob),
            })
            .collect(),
        info: TranscriptionInfo {
            language: language.map(ToString::to_string),
            language_probability: None,
            duration: None,
            extra: std::collections::BTreeMap::new(),
        },
    }
}

/// A job store backed by a SQLite file in a fresh temporary directory.
///
/// The directory doubles as the storage root for artifact tests; it is
/// removed when the returned guard drops.
///
/// # Panics
///
/// Panics if the temporary directory or database cannot be created.
pub async fn temp_job_store() -> (tempfile::TempDir, JobStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("jobs.sqlite").display());
    let store = JobStore::connect(&url).await.expect("connect job store");
    (dir, store)
}
