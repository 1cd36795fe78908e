//! Errors surfaced by the speech-stack seams.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an ASR engine.
#[derive(Debug, Error)]
pub enum AsrError {
    /// The engine has not been configured for this deployment.
    #[error("no ASR engine is configured")]
    EngineUnavailable,
    /// The engine failed while transcribing.
    #[error("transcription failed: {message}")]
    Transcription {
        /// Engine-reported failure detail.
        message: String,
    },
}

/// Errors raised by an audio decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file could not be decoded as audio. Not retryable.
    #[error("invalid audio: {reason}")]
    InvalidAudio {
        /// Decoder-reported failure detail.
        reason: String,
    },
    /// The file could not be read.
    #[error("failed to read audio at {path}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Errors raised by the translator.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The requested direction is outside EN↔FR.
    #[error("translation from {from} to {target} is not supported")]
    UnsupportedDirection {
        /// Requested source language.
        from: String,
        /// Requested target language.
        target: String,
    },
    /// The translation backend failed.
    #[error("translation failed: {message}")]
    Backend {
        /// Backend-reported failure detail.
        message: String,
    },
}
