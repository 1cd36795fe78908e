//! Gate decisions and their metric classification.
//!
//! The decision is a tagged variant internally; the wire and metrics
//! boundaries see only the stable string labels.

use serde::{Serialize, Serializer};

/// Terminal outcomes of the language gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// High-confidence autodetect with a speechy transcript.
    HighConf,
    /// Mid-zone accept driven by English stop-word dominance.
    MidZoneEn,
    /// Mid-zone accept driven by French stop-word dominance.
    MidZoneFr,
    /// Accepted on the VAD retry.
    VadRetry,
    /// Probe contained background music only.
    MusicOnly,
    /// Forced EN/FR choice by the scoring fallback.
    Fallback,
    /// Unclassifiable decision (defensive default for foreign labels).
    Unknown,
}

/// How the accepted language was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Plain autodetection on the probe.
    Autodetect,
    /// Autodetection with the VAD filter enabled.
    AutodetectVad,
    /// Forced-choice scoring fallback.
    Fallback,
}

impl GateDecision {
    /// Stable wire label, preserved exactly at the metrics boundary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighConf => "accepted_high_conf",
            Self::MidZoneEn => "accepted_mid_zone_en",
            Self::MidZoneFr => "accepted_mid_zone_fr",
            Self::VadRetry => "vad_retry",
            Self::MusicOnly => "NO_SPEECH_MUSIC_ONLY",
            Self::Fallback => "fallback",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire label back into a decision, defaulting to `Unknown`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "accepted_high_conf" => Self::HighConf,
            "accepted_mid_zone_en" => Self::MidZoneEn,
            "accepted_mid_zone_fr" => Self::MidZoneFr,
            "vad_retry" => Self::VadRetry,
            "fallback" => Self::Fallback,
            _ if label.eq_ignore_ascii_case("no_speech_music_only") => Self::MusicOnly,
            _ => Self::Unknown,
        }
    }

    /// Stable gate-path label for the decisions counter. A set `music_only`
    /// flag wins regardless of the decision label.
    #[must_use]
    pub const fn gate_path(self, music_only: bool) -> &'static str {
        if music_only {
            return "music_only";
        }
        match self {
            Self::HighConf => "high_conf_base",
            Self::MidZoneEn => "mid_zone_en",
            Self::MidZoneFr => "mid_zone_fr",
            Self::VadRetry => "vad_retry",
            Self::MusicOnly => "music_only",
            Self::Fallback => "fallback",
            Self::Unknown => "unknown",
        }
    }

    /// Coarse pipeline-mode label for the decisions counter.
    #[must_use]
    pub const fn pipeline_mode(self, music_only: bool) -> &'static str {
        if music_only {
            return "MUSIC_ONLY";
        }
        match self {
            Self::HighConf => "BASE",
            Self::MidZoneEn | Self::MidZoneFr => "MID_ZONE",
            Self::VadRetry => "VAD",
            Self::MusicOnly => "MUSIC_ONLY",
            Self::Fallback => "FALLBACK",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Serialize for GateDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl DetectionMethod {
    /// Stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Autodetect => "autodetect",
            Self::AutodetectVad => "autodetect-vad",
            Self::Fallback => "fallback",
        }
    }
}

impl Serialize for DetectionMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
