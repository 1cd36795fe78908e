//! Placeholder speech-stack adapters.
//!
//! The ASR model, audio decoder, and translator are deployment concerns:
//! integrations wire their own implementations of the `parlance-asr` traits
//! into [`crate::bootstrap`]. These placeholders keep the control plane fully
//! operational without them; jobs fail with an explicit error instead of the
//! process refusing to start.

use std::path::Path;

use async_trait::async_trait;
use parlance_asr::{
    AsrEngine, AsrError, AudioDecoder, DecodeError, Language, TranscribeOptions, Transcription,
    TranslateError, Translator,
};

/// Engine placeholder used when no ASR adapter is wired in.
pub struct UnboundEngine;

#[async_trait]
impl AsrEngine for UnboundEngine {
    async fn transcribe(
        &self,
        _audio: &[f32],
        _options: TranscribeOptions,
    ) -> Result<Transcription, AsrError> {
        Err(AsrError::EngineUnavailable)
    }
}

/// Decoder placeholder used when no audio adapter is wired in.
pub struct UnboundDecoder;

#[async_trait]
impl AudioDecoder for UnboundDecoder {
    async fn decode(&self, _path: &Path) -> Result<Vec<f32>, DecodeError> {
        Err(DecodeError::InvalidAudio {
            reason: "no audio decoder configured".to_string(),
        })
    }
}

/// Translator placeholder used when no translation adapter is wired in.
pub struct UnboundTranslator;

#[async_trait]
impl Translator for UnboundTranslator {
    async fn translate(
        &self,
        _text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, TranslateError> {
        Err(TranslateError::Backend {
            message: format!("no translator configured for {source}->{target}"),
        })
    }
}
