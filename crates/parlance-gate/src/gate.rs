//! The gate state machine.

use std::sync::Arc;

use parlance_asr::{AsrEngine, Language, SAMPLE_RATE, TranscribeOptions};
use parlance_telemetry::{MetricEvent, MetricsSender};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::GateConfig;
use crate::decision::{DetectionMethod, GateDecision};
use crate::error::GateError;
use crate::text::{
    EN_STOPWORDS, FR_STOPWORDS, MUSIC_KEYWORDS, is_music_only_transcript, stopword_ratio, tokenize,
};

/// Length of the detection probe in seconds.
pub const PROBE_DURATION_S: usize = 30;

/// Score assigned to a language whose scoring pass produced no segments.
const EMPTY_SCORE: f64 = -99.0;

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct GateResult {
    /// Accepted language; `None` for music-only content.
    pub language: Option<Language>,
    /// Engine-reported probability; `None` on the fallback path.
    pub probability: Option<f64>,
    /// How the language was determined.
    pub method: DetectionMethod,
    /// Terminal decision label.
    pub gate_decision: GateDecision,
    /// Whether the accepted detection used the VAD filter.
    pub use_vad: bool,
    /// Whether the probe was classified as background music only.
    pub music_only: bool,
    /// Transcript statistics and the thresholds in force.
    pub gate_meta: GateMeta,
}

impl GateResult {
    /// Wire label for the accepted language (`en`, `fr`, or `none`).
    #[must_use]
    pub fn language_label(&self) -> &'static str {
        self.language.map_or("none", Language::as_str)
    }
}

/// Transcript statistics and configuration snapshot attached to every
/// decision.
#[derive(Debug, Clone, Serialize)]
pub struct GateMeta {
    /// Whether the probability fell in the mid-confidence zone.
    pub mid_zone: bool,
    /// Wire label of the accepted language.
    pub language: String,
    /// Probability coerced to a number (0.0 when absent).
    pub probability: f64,
    /// English stop-word ratio over the probe transcript.
    pub stopword_ratio_en: f64,
    /// French stop-word ratio over the probe transcript.
    pub stopword_ratio_fr: f64,
    /// Token count of the probe transcript.
    pub token_count: usize,
    /// Whether the accepted detection used the VAD filter.
    pub vad_used: bool,
    /// Whether the probe was classified as background music only.
    pub music_only: bool,
    /// Thresholds in force at decision time.
    pub config: GateMetaConfig,
}

/// Snapshot of the configured thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct GateMetaConfig {
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
    pub min_tokens: usize,
    /// Music keywords recognized by the music-only classifier.
    pub music_keywords: Vec<String>,
}

/// The language gate. Cheap to clone; the engine is shared.
#[derive(Clone)]
pub struct LanguageGate {
    engine: Arc<dyn AsrEngine>,
    config: GateConfig,
    metrics: MetricsSender,
}

impl LanguageGate {
    /// Build a gate over the given engine and thresholds.
    #[must_use]
    pub fn new(engine: Arc<dyn AsrEngine>, config: GateConfig, metrics: MetricsSender) -> Self {
        Self {
            engine,
            config,
            metrics,
        }
    }

    /// Thresholds this gate evaluates against.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the decision state machine over the clip.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::StrictReject`] when strict mode rejects the clip,
    /// or an engine error when transcription fails.
    pub async fn evaluate(&self, audio: &[f32]) -> Result<GateResult, GateError> {
        let probe = probe_of(audio);

        // 1. Standard detection on the probe, no VAD.
        let base = self
            .engine
            .transcribe(probe, TranscribeOptions::default())
            .await?;
        let transcript = base.joined_text();
        let detected_lang = base.info.language.clone();
        let probability = base.info.language_probability;
        let prob_value = probability.unwrap_or(0.0);
        info!(
            language = detected_lang.as_deref().unwrap_or("unknown"),
            probability = prob_value,
            "probe autodetect"
        );

        let tokens = tokenize(&transcript);
        let token_count = tokens.len();
        let en_ratio = stopword_ratio(&tokens, EN_STOPWORDS);
        let fr_ratio = stopword_ratio(&tokens, FR_STOPWORDS);

        // 2. Music-only wins over every probability path.
        if is_music_only_transcript(&transcript) {
            info!("probe transcript is background music only");
            return Ok(self.build_result(
                None,
                probability,
                DetectionMethod::Autodetect,
                GateDecision::MusicOnly,
                false,
                0.0,
                0.0,
                token_count,
                true,
            ));
        }

        if let Some(lang_code) = detected_lang.as_deref().filter(|l| self.config.allows(l)) {
            let language = lang_code.parse::<Language>().ok();

            // 3. High-confidence accept, guarded by the speechy check.
            if prob_value >= self.config.mid_upper {
                let dominant_ratio = en_ratio.max(fr_ratio);
                if let Some(language) = language
                    && token_count >= self.config.min_tokens_speech
                    && dominant_ratio >= self.config.min_stopword_speech
                {
                    info!(
                        language = %language,
                        probability = prob_value,
                        tokens = token_count,
                        "high confidence accept"
                    );
                    self.metrics.emit(MetricEvent::AutodetectAccept);
                    return Ok(self.build_result(
                        Some(language),
                        probability,
                        DetectionMethod::Autodetect,
                        GateDecision::HighConf,
                        false,
                        en_ratio,
                        fr_ratio,
                        token_count,
                        false,
                    ));
                }
                info!(
                    probability = prob_value,
                    tokens = token_count,
                    "high probability but transcript not speechy; retrying with VAD"
                );
            }

            // 4. Mid-zone stop-word heuristic.
            if prob_value >= self.config.mid_lower
                && prob_value < self.config.mid_upper
                && token_count >= self.config.min_tokens_heuristic
            {
                if language == Some(Language::En)
                    && en_ratio >= self.config.min_stopword_en
                    && en_ratio > fr_ratio + self.config.stopword_margin
                {
                    info!(
                        probability = prob_value,
                        en_ratio, fr_ratio, "mid-zone accept (en)"
                    );
                    self.metrics.emit(MetricEvent::AutodetectAccept);
                    return Ok(self.build_result(
                        Some(Language::En),
                        probability,
                        DetectionMethod::Autodetect,
                        GateDecision::MidZoneEn,
                        false,
                        en_ratio,
                        fr_ratio,
                        token_count,
                        false,
                    ));
                }
                if language == Some(Language::Fr)
                    && fr_ratio >= self.config.min_stopword_fr
                    && fr_ratio > en_ratio + self.config.stopword_margin
                {
                    info!(
                        probability = prob_value,
                        en_ratio, fr_ratio, "mid-zone accept (fr)"
                    );
                    self.metrics.emit(MetricEvent::AutodetectAccept);
                    return Ok(self.build_result(
                        Some(Language::Fr),
                        probability,
                        DetectionMethod::Autodetect,
                        GateDecision::MidZoneFr,
                        false,
                        en_ratio,
                        fr_ratio,
                        token_count,
                        false,
                    ));
                }
            }
        }

        // 5. VAD retry on the same probe.
        info!("initial detection insufficient; retrying with VAD");
        let vad = self
            .engine
            .transcribe(
                probe,
                TranscribeOptions {
                    vad_filter: true,
                    ..TranscribeOptions::default()
                },
            )
            .await?;
        let transcript_vad = vad.joined_text();
        let vad_probability = vad.info.language_probability;
        let vad_prob_value = vad_probability.unwrap_or(0.0);

        if is_music_only_transcript(&transcript_vad) {
            info!("VAD transcript is background music only");
            return Ok(self.build_result(
                None,
                vad_probability,
                DetectionMethod::AutodetectVad,
                GateDecision::MusicOnly,
                true,
                0.0,
                0.0,
                tokenize(&transcript_vad).len(),
                true,
            ));
        }

        if let Some(vad_lang) = vad.info.language.as_deref().filter(|l| self.config.allows(l))
            && vad_prob_value >= self.config.lang_detect_min_prob
            && let Ok(language) = vad_lang.parse::<Language>()
        {
            info!(
                language = %language,
                probability = vad_prob_value,
                "autodetect accepted via VAD retry"
            );
            self.metrics.emit(MetricEvent::AutodetectAccept);
            return Ok(self.build_result(
                Some(language),
                vad_probability,
                DetectionMethod::AutodetectVad,
                GateDecision::VadRetry,
                true,
                en_ratio,
                fr_ratio,
                token_count,
                false,
            ));
        }

        // 6. Terminal disposition: strict rejection or scoring fallback.
        warn!(
            language = detected_lang.as_deref().unwrap_or("unknown"),
            probability = prob_value,
            "autodetect rejected; entering fallback/reject logic"
        );
        self.metrics.emit(MetricEvent::AutodetectReject);

        if self.config.strict_reject {
            return Err(GateError::StrictReject {
                detail: format!(
                    "Only English/French audio supported (p={prob_value:.2}, got '{}').",
                    detected_lang.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let chosen = self.pick_language_by_scoring(probe).await?;
        Ok(self.build_result(
            Some(chosen),
            None,
            DetectionMethod::Fallback,
            GateDecision::Fallback,
            true,
            en_ratio,
            fr_ratio,
            token_count,
            false,
        ))
    }

    /// Synchronous strict validator used at ingress before a job is queued.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::StrictReject`] for music-only content, non-EN/FR
    /// detections, or low confidence; engine errors pass through.
    pub async fn validate_strict(&self, audio: &[f32]) -> Result<(), GateError> {
        let probe = probe_of(audio);
        let result = self
            .engine
            .transcribe(probe, TranscribeOptions::default())
            .await?;
        let transcript = result.joined_text();

        if is_music_only_transcript(&transcript) {
            return Err(GateError::StrictReject {
                detail: "Only English/French speech supported (music-only content detected)."
                    .to_string(),
            });
        }

        let detected = result.info.language.as_deref().unwrap_or("unknown");
        let probability = result.info.language_probability.unwrap_or(0.0);
        if !self.config.allows(detected) || probability < self.config.lang_detect_min_prob {
            return Err(GateError::StrictReject {
                detail: format!(
                    "Only English/French audio supported (p={probability:.2}, got '{detected}')."
                ),
            });
        }
        Ok(())
    }

    /// Run cheap forced transcriptions for both languages and pick the one
    /// with the higher mean segment log probability.
    async fn pick_language_by_scoring(&self, probe: &[f32]) -> Result<Language, GateError> {
        let mut chosen = Language::En;
        let mut best = f64::NEG_INFINITY;
        let mut scores = Vec::with_capacity(2);

        for language in [Language::En, Language::Fr] {
            let transcription = self
                .engine
                .transcribe(
                    probe,
                    TranscribeOptions {
                        language: Some(language),
                        vad_filter: true,
                        beam_size: 1,
                        best_of: Some(1),
                        suppress_blank: false,
                    },
                )
                .await?;
            let logprobs: Vec<f64> = transcription
                .segments
                .iter()
                .filter_map(|segment| segment.avg_logprob)
                .collect();
            let score = if logprobs.is_empty() {
                EMPTY_SCORE
            } else {
                #[allow(clippy::cast_precision_loss)]
                let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
                mean
            };
            scores.push((language, score));
            if score > best {
                best = score;
                chosen = language;
            }
        }

        info!(?scores, chosen = %chosen, "fallback scoring complete");
        self.metrics.emit(MetricEvent::FallbackUsed);
        Ok(chosen)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        language: Option<Language>,
        probability: Option<f64>,
        method: DetectionMethod,
        gate_decision: GateDecision,
        use_vad: bool,
        en_ratio: f64,
        fr_ratio: f64,
        token_count: usize,
        music_only: bool,
    ) -> GateResult {
        let prob_value = probability.unwrap_or(0.0);
        let language_label = language.map_or_else(|| "none".to_string(), |l| l.as_str().to_string());
        let gate_meta = GateMeta {
            mid_zone: prob_value >= self.config.mid_lower && prob_value < self.config.mid_upper,
            language: language_label,
            probability: prob_value,
            stopword_ratio_en: en_ratio,
            stopword_ratio_fr: fr_ratio,
            token_count,
            vad_used: use_vad,
            music_only,
            config: GateMetaConfig {
                mid_lower: self.config.mid_lower,
                mid_upper: self.config.mid_upper,
                min_stopword_en: self.config.min_stopword_en,
                min_stopword_fr: self.config.min_stopword_fr,
                stopword_margin: self.config.stopword_margin,
                min_tokens: self.config.min_tokens_heuristic,
                music_keywords: MUSIC_KEYWORDS.iter().map(ToString::to_string).collect(),
            },
        };
        GateResult {
            language,
            probability,
            method,
            gate_decision,
            use_vad,
            music_only,
            gate_meta,
        }
    }
}

fn probe_of(audio: &[f32]) -> &[f32] {
    let probe_samples = PROBE_DURATION_S * SAMPLE_RATE as usize;
    &audio[..audio.len().min(probe_samples)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_telemetry::MetricsSender;
    use parlance_test_support::{ScriptedEngine, transcription, transcription_with_logprobs};

    fn gate_with(engine: ScriptedEngine, config: GateConfig) -> (Arc<ScriptedEngine>, LanguageGate) {
        let engine = Arc::new(engine);
        let gate = LanguageGate::new(engine.clone(), config, MetricsSender::disabled());
        (engine, gate)
    }

    fn audio() -> Vec<f32> {
        vec![0.0; SAMPLE_RATE as usize]
    }

    #[tokio::test]
    async fn high_confidence_speechy_transcript_accepts_without_vad() {
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![transcription(
                "the quick brown fox jumps over the lazy dog today",
                Some("en"),
                Some(0.92),
            )]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::HighConf);
        assert_eq!(result.language, Some(Language::En));
        assert_eq!(result.method.as_str(), "autodetect");
        assert!(!result.use_vad);
        assert!(!result.gate_meta.vad_used);
        assert_eq!(engine.call_count(), 1, "no second ASR invocation");
    }

    #[tokio::test]
    async fn mid_zone_french_accepts_on_stopword_margin() {
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![transcription(
                "le chat est sur la table et nous regardons les etoiles",
                Some("fr"),
                Some(0.70),
            )]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::MidZoneFr);
        assert_eq!(result.language, Some(Language::Fr));
        assert!(result.gate_meta.mid_zone);
        assert!(result.gate_meta.stopword_ratio_fr > result.gate_meta.stopword_ratio_en);
        assert_eq!(engine.call_count(), 1, "no second ASR invocation");
    }

    #[tokio::test]
    async fn vad_retry_accepts_when_confidence_recovers() {
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("uh", Some("en"), Some(0.30)),
                transcription("bonjour tout le monde ce soir", Some("fr"), Some(0.81)),
            ]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::VadRetry);
        assert_eq!(result.language, Some(Language::Fr));
        assert_eq!(result.method.as_str(), "autodetect-vad");
        assert!(result.use_vad);

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].vad_filter);
        assert!(calls[1].vad_filter);
    }

    #[tokio::test]
    async fn music_only_probe_short_circuits() {
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![transcription(
                "[♪ soft background music ♪]",
                Some("en"),
                Some(0.95),
            )]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::MusicOnly);
        assert_eq!(result.language, None);
        assert_eq!(result.language_label(), "none");
        assert!(result.music_only);
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn music_only_is_detected_on_the_vad_pass_too() {
        let (_engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("mmm", Some("en"), Some(0.30)),
                transcription("♪ music ♪", Some("en"), Some(0.40)),
            ]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::MusicOnly);
        assert!(result.use_vad);
        assert_eq!(result.method.as_str(), "autodetect-vad");
    }

    #[tokio::test]
    async fn scoring_fallback_picks_higher_logprob_language() {
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("hola amigos como estan ustedes hoy", Some("es"), Some(0.42)),
                transcription("hola amigos", Some("es"), Some(0.45)),
                transcription_with_logprobs(Some("en"), &[("hello friends", -1.1)]),
                transcription_with_logprobs(Some("fr"), &[("bonjour amis", -1.8)]),
            ]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::Fallback);
        assert_eq!(result.language, Some(Language::En));
        assert!(result.probability.is_none());
        assert_eq!(result.method.as_str(), "fallback");
        assert_eq!(engine.call_count(), 4);

        let calls = engine.calls();
        assert_eq!(calls[2].language, Some(Language::En));
        assert_eq!(calls[2].best_of, Some(1));
        assert!(calls[2].vad_filter);
        assert_eq!(calls[3].language, Some(Language::Fr));
    }

    #[tokio::test]
    async fn empty_scoring_segments_default_to_floor_score() {
        let (_engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("hola amigos como estan ustedes hoy", Some("es"), Some(0.42)),
                transcription("hola amigos", Some("es"), Some(0.45)),
                transcription_with_logprobs(Some("en"), &[]),
                transcription_with_logprobs(Some("fr"), &[("bonjour", -5.0)]),
            ]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.language, Some(Language::Fr), "-5.0 beats the -99 floor");
    }

    #[tokio::test]
    async fn strict_mode_rejects_instead_of_falling_back() {
        let config = GateConfig {
            strict_reject: true,
            ..GateConfig::default()
        };
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("hola amigos como estan ustedes hoy", Some("es"), Some(0.42)),
                transcription("hola amigos", Some("es"), Some(0.45)),
            ]),
            config,
        );

        let err = gate.evaluate(&audio()).await.expect_err("strict reject");
        assert!(matches!(err, GateError::StrictReject { .. }));
        assert_eq!(engine.call_count(), 2, "no scoring pass in strict mode");
    }

    #[tokio::test]
    async fn high_probability_without_speechy_transcript_goes_to_vad() {
        let (engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("mhm", Some("en"), Some(0.90)),
                transcription("right so the plan for today is simple", Some("en"), Some(0.88)),
            ]),
            GateConfig::default(),
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert_eq!(result.gate_decision, GateDecision::VadRetry);
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn gate_meta_exposes_thresholds_in_force() {
        let config = GateConfig {
            mid_upper: 0.85,
            min_tokens_heuristic: 12,
            ..GateConfig::default()
        };
        let (_engine, gate) = gate_with(
            ScriptedEngine::new(vec![transcription(
                "the quick brown fox jumps over the lazy dog today",
                Some("en"),
                Some(0.95),
            )]),
            config,
        );

        let result = gate.evaluate(&audio()).await.expect("gate result");
        assert!((result.gate_meta.config.mid_upper - 0.85).abs() < f64::EPSILON);
        assert_eq!(result.gate_meta.config.min_tokens, 12);
        assert_eq!(
            result.gate_meta.config.music_keywords,
            vec!["music".to_string(), "musique".to_string()]
        );
    }

    #[tokio::test]
    async fn strict_validator_accepts_confident_english() {
        let (_engine, gate) = gate_with(
            ScriptedEngine::new(vec![transcription(
                "we are recording a short message for you today",
                Some("en"),
                Some(0.92),
            )]),
            GateConfig::default(),
        );
        gate.validate_strict(&audio()).await.expect("accepted");
    }

    #[tokio::test]
    async fn strict_validator_rejects_music_and_foreign_audio() {
        let (_engine, gate) = gate_with(
            ScriptedEngine::new(vec![
                transcription("[music]", Some("en"), Some(0.92)),
                transcription("hola a todos", Some("es"), Some(0.90)),
            ]),
            GateConfig::default(),
        );
        let music = gate.validate_strict(&audio()).await.expect_err("music");
        assert!(music.to_string().contains("music-only"));
        let foreign = gate.validate_strict(&audio()).await.expect_err("foreign");
        assert!(foreign.to_string().contains("'es'"));
    }
}
