#![forbid(unsafe_code)]

//! Scripted speech-stack fakes and store fixtures shared across the
//! workspace's test suites.

pub mod engines;
pub mod fixtures;

pub use engines::{FailingDecoder, RecordingTranslator, ScriptedEngine, StaticDecoder};
pub use fixtures::{temp_job_store, transcription, transcription_with_logprobs};
