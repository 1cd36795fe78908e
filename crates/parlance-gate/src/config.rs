//! Gate thresholds and allowed-language set.

use std::collections::BTreeSet;

/// Configuration the gate evaluates against. Values are captured in
/// `gate_meta` so every decision records the thresholds in force.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Canonical language codes the gate may accept.
    pub allowed_langs: BTreeSet<String>,
    /// Minimum probability for the VAD retry to stand.
    pub lang_detect_min_prob: f64,
    /// Reject instead of falling back when no path accepts.
    pub strict_reject: bool,
    /// Lower bound of the mid-confidence zone.
    pub mid_lower: f64,
    /// Upper bound (exclusive) of the mid-confidence zone.
    pub mid_upper: f64,
    /// Minimum English stop-word ratio for a mid-zone accept.
    pub min_stopword_en: f64,
    /// Minimum French stop-word ratio for a mid-zone accept.
    pub min_stopword_fr: f64,
    /// Margin the dominant stop-word ratio must win by.
    pub stopword_margin: f64,
    /// Minimum token count before the mid-zone heuristic applies.
    pub min_tokens_heuristic: usize,
    /// Minimum token count for a transcript to count as speech.
    pub min_tokens_speech: usize,
    /// Minimum dominant stop-word ratio for a transcript to count as speech.
    pub min_stopword_speech: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_langs: ["en", "fr"].iter().map(ToString::to_string).collect(),
            lang_detect_min_prob: 0.60,
            strict_reject: false,
            mid_lower: 0.60,
            mid_upper: 0.79,
            min_stopword_en: 0.15,
            min_stopword_fr: 0.15,
            stopword_margin: 0.05,
            min_tokens_heuristic: 10,
            min_tokens_speech: 6,
            min_stopword_speech: 0.10,
        }
    }
}

impl GateConfig {
    /// Whether the given engine-reported code is in the allowed set.
    #[must_use]
    pub fn allows(&self, lang: &str) -> bool {
        self.allowed_langs.contains(lang)
    }
}
