#![forbid(unsafe_code)]

//! Trait seams for the speech stack Parlance orchestrates but does not
//! implement: the ASR engine, the audio decoder, and the EN/FR translator.
//!
//! Concrete adapters (Whisper-family models, ffmpeg-backed decoding, Marian
//! translation) live outside this repository; everything in the control plane
//! talks to these traits, and tests substitute scripted implementations.

pub mod engine;
pub mod error;
pub mod language;

pub use engine::{
    AsrEngine, AudioDecoder, SAMPLE_RATE, Segment, TranscribeOptions, Transcription,
    TranscriptionInfo, Translator,
};
pub use error::{AsrError, DecodeError, TranslateError};
pub use language::{IsoFormat, Language};
