//! Engine, decoder, and translator contracts.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AsrError, DecodeError, TranslateError};
use crate::language::Language;

/// Sample rate every decoder implementation must deliver.
pub const SAMPLE_RATE: u32 = 16_000;

/// Options for a single transcription call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    /// Force a specific language instead of autodetecting.
    pub language: Option<Language>,
    /// Run voice-activity detection before inference.
    pub vad_filter: bool,
    /// Beam width for decoding.
    pub beam_size: u32,
    /// Candidates sampled per beam, when the engine supports it.
    pub best_of: Option<u32>,
    /// Suppress blank outputs at the start of sampling.
    pub suppress_blank: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            vad_filter: false,
            beam_size: 1,
            best_of: None,
            suppress_blank: false,
        }
    }
}

/// One decoded segment of speech.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    /// Transcribed text for the segment.
    pub text: String,
    /// Mean log probability over the segment's tokens.
    pub avg_logprob: Option<f64>,
}

/// Engine-reported metadata for a transcription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionInfo {
    /// Detected (or forced) language code.
    pub language: Option<String>,
    /// Probability attached to the detected language.
    pub language_probability: Option<f64>,
    /// Audio duration in seconds, when the engine reports it.
    pub duration: Option<f64>,
    /// Additional serializable engine metadata. Verbose entries such as
    /// `transcription_options` are dropped before results are persisted.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A transcription result: the segment stream plus its metadata.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    /// Decoded segments in order.
    pub segments: Vec<Segment>,
    /// Engine-reported metadata.
    pub info: TranscriptionInfo,
}

impl Transcription {
    /// Concatenate the non-empty segment texts with single spaces.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Speech-recognition engine contract.
///
/// Implementations are expected to be lazily-initialized singletons shared by
/// every worker in the process; calls may block on CPU or GPU work.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    /// Transcribe a mono 16-kHz float sample buffer.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine is unavailable or inference fails.
    async fn transcribe(
        &self,
        audio: &[f32],
        options: TranscribeOptions,
    ) -> Result<Transcription, AsrError>;
}

/// Audio decoder contract: file path in, mono 16-kHz float samples out.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decode the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidAudio`] when the file cannot be decoded
    /// as audio, or an IO error when it cannot be read at all.
    async fn decode(&self, path: &Path) -> Result<Vec<f32>, DecodeError>;
}

/// Translator contract, restricted to the EN↔FR pair.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported directions or backend failures.
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, TranslateError>;
}
