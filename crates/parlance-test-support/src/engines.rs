//! Scripted implementations of the speech-stack traits.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use parlance_asr::{
    AsrEngine, AsrError, AudioDecoder, DecodeError, Language, TranscribeOptions, Transcription,
    TranslateError, Translator,
};

/// ASR engine that replays a queue of canned transcriptions and records the
/// options of every call for later assertions.
#[derive(Default)]
pub struct ScriptedEngine {
    outcomes: Mutex<VecDeque<Transcription>>,
    calls: Mutex<Vec<TranscribeOptions>>,
}

impl ScriptedEngine {
    /// Engine that will serve the given transcriptions in order.
    #[must_use]
    pub fn new(outcomes: Vec<Transcription>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Options of every `transcribe` call made so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<TranscribeOptions> {
        self.calls.lock().expect("calls mutex").clone()
    }

    /// Number of `transcribe` calls made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls mutex").len()
    }
}

#[async_trait]
impl AsrEngine for ScriptedEngine {
    async fn transcribe(
        &self,
        _audio: &[f32],
        options: TranscribeOptions,
    ) -> Result<Transcription, AsrError> {
        self.calls.lock().expect("calls mutex").push(options);
        self.outcomes
            .lock()
            .expect("outcomes mutex")
            .pop_front()
            .ok_or_else(|| AsrError::Transcription {
                message: "scripted engine exhausted".to_string(),
            })
    }
}

/// Decoder that returns the same sample buffer for every path.
pub struct StaticDecoder {
    samples: Vec<f32>,
}

impl StaticDecoder {
    /// Decoder yielding `samples` for every call.
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Decoder yielding `seconds` of silence at 16 kHz.
    #[must_use]
    pub fn silence(seconds: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = (seconds * f64::from(parlance_asr::SAMPLE_RATE)) as usize;
        Self::new(vec![0.0; len])
    }
}

#[async_trait]
impl AudioDecoder for StaticDecoder {
    async fn decode(&self, _path: &Path) -> Result<Vec<f32>, DecodeError> {
        Ok(self.samples.clone())
    }
}

/// Decoder that rejects every file as invalid audio.
#[derive(Default)]
pub struct FailingDecoder;

#[async_trait]
impl AudioDecoder for FailingDecoder {
    async fn decode(&self, path: &Path) -> Result<Vec<f32>, DecodeError> {
        Err(DecodeError::InvalidAudio {
            reason: format!("unreadable fixture at {}", path.display()),
        })
    }
}

/// Translator that wraps the input and records every call.
#[derive(Default)]
pub struct RecordingTranslator {
    calls: Mutex<Vec<(String, Language, Language)>>,
}

impl RecordingTranslator {
    /// Calls made so far as `(text, source, target)` tuples.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Language, Language)> {
        self.calls.lock().expect("calls mutex").clone()
    }
}

#[async_trait]
impl Translator for RecordingTranslator {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, TranslateError> {
        self.calls
            .lock()
            .expect("calls mutex")
            .push((text.to_string(), source, target));
        Ok(format!("[{target}] {text}"))
    }
}
