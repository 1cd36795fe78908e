//! Gate errors.

use parlance_asr::AsrError;
use thiserror::Error;

/// Errors raised while evaluating the language gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// Strict mode rejected the clip as non-EN/FR or low confidence.
    #[error("{detail}")]
    StrictReject {
        /// Human-readable rejection message.
        detail: String,
    },
    /// The ASR engine failed.
    #[error(transparent)]
    Asr(#[from] AsrError),
}
