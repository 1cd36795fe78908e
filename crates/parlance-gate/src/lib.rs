#![forbid(unsafe_code)]

//! EN/FR language gate: a multi-path decision state machine over a cheap
//! audio probe.
//!
//! The gate transcribes the first 30 seconds of a clip, classifies
//! music-only content, accepts confident speechy detections directly, applies
//! stop-word heuristics in the mid-confidence zone, retries once with VAD,
//! and finally either rejects (strict mode) or falls back to a forced-choice
//! scoring pass. Every terminal path yields a stable, labeled decision that
//! metrics and results consume unchanged.

pub mod config;
pub mod decision;
pub mod error;
pub mod gate;
pub mod text;

pub use config::GateConfig;
pub use decision::{DetectionMethod, GateDecision};
pub use error::GateError;
pub use gate::{GateMeta, GateResult, LanguageGate, PROBE_DURATION_S};
pub use text::truncate_to_words;
