//! Environment-derived service settings.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Default maximum upload size in megabytes.
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;

/// Extensions accepted for upload when `ALLOWED_EXTS` is unset.
const DEFAULT_ALLOWED_EXTS: &[&str] = &[".wav", ".wave", ".mp3", ".m4a", ".aac"];

/// Language-gate thresholds, overridable through the `LANG_*` environment
/// variables. Defaults match the values the gate was tuned with.
#[derive(Debug, Clone, PartialEq)]
pub struct GateThresholds {
    /// Lower bound of the mid-confidence zone.
    pub mid_lower: f64,
    /// Upper bound (exclusive) of the mid-confidence zone.
    pub mid_upper: f64,
    /// Minimum English stop-word ratio for a mid-zone accept.
    pub min_stopword_en: f64,
    /// Minimum French stop-word ratio for a mid-zone accept.
    pub min_stopword_fr: f64,
    /// Margin by which the dominant stop-word ratio must beat the other.
    pub stopword_margin: f64,
    /// Minimum token count before the mid-zone heuristic applies.
    pub min_tokens_heuristic: usize,
    /// Minimum token count for a transcript to look like speech.
    pub min_tokens_speech: usize,
    /// Minimum dominant stop-word ratio for a transcript to look like speech.
    pub min_stopword_speech: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
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

/// Immutable service settings, loaded once at process start.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding uploaded audio artifacts.
    pub storage_dir: PathBuf,
    /// Directory for file-based log sinks.
    pub log_dir: PathBuf,
    /// Database connection URL.
    pub db_url: String,
    /// Address the HTTP listener binds to.
    pub bind_addr: IpAddr,
    /// Port the HTTP listener binds to.
    pub http_port: u16,
    /// Number of parallel pipeline workers.
    pub max_workers: usize,
    /// Failed attempts tolerated before a job goes terminal.
    pub max_retries: u32,
    /// Upload size ceiling in megabytes.
    pub max_file_size_mb: u64,
    /// Lowercase extensions (with leading dot) accepted for upload.
    pub allowed_exts: BTreeSet<String>,
    /// Canonical language codes accepted by the gate.
    pub allowed_langs: BTreeSet<String>,
    /// Minimum probability for an autodetect result to stand on its own.
    pub lang_detect_min_prob: f64,
    /// Reject non-EN/FR uploads at ingress instead of falling back.
    pub enfr_strict_reject: bool,
    /// Language-gate thresholds.
    pub gate: GateThresholds,
    /// Seconds workers get to finish the current job on shutdown.
    pub shutdown_grace_secs: u64,
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
            log_dir: PathBuf::from("logs"),
            db_url: "sqlite://parlance.sqlite?mode=rwc".to_string(),
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            http_port: 8000,
            max_workers: 2,
            max_retries: 2,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            allowed_exts: DEFAULT_ALLOWED_EXTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            allowed_langs: ["en", "fr"].iter().map(ToString::to_string).collect(),
            lang_detect_min_prob: 0.60,
            enfr_strict_reject: false,
            gate: GateThresholds::default(),
            shutdown_grace_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment, falling back to defaults
    /// for anything unset.
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable holds an unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings from an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error when a present value fails to parse.
    pub fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let gate = GateThresholds {
            mid_lower: parse_or("LANG_MID_LOWER", &lookup, defaults.gate.mid_lower)?,
            mid_upper: parse_or("LANG_MID_UPPER", &lookup, defaults.gate.mid_upper)?,
            min_stopword_en: parse_or(
                "LANG_MIN_STOPWORD_EN",
                &lookup,
                defaults.gate.min_stopword_en,
            )?,
            min_stopword_fr: parse_or(
                "LANG_MIN_STOPWORD_FR",
                &lookup,
                defaults.gate.min_stopword_fr,
            )?,
            stopword_margin: parse_or(
                "LANG_STOPWORD_MARGIN",
                &lookup,
                defaults.gate.stopword_margin,
            )?,
            min_tokens_heuristic: parse_or(
                "LANG_MIN_TOKENS",
                &lookup,
                defaults.gate.min_tokens_heuristic,
            )?,
            min_tokens_speech: parse_or(
                "LANG_MIN_TOKENS_SPEECH",
                &lookup,
                defaults.gate.min_tokens_speech,
            )?,
            min_stopword_speech: parse_or(
                "LANG_MIN_STOPWORD_SPEECH",
                &lookup,
                defaults.gate.min_stopword_speech,
            )?,
        };

        Ok(Self {
            storage_dir: lookup("STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from),
            log_dir: lookup("LOG_DIR").map_or(defaults.log_dir, PathBuf::from),
            db_url: lookup("DB_URL").unwrap_or(defaults.db_url),
            bind_addr: parse_or("BIND_ADDR", &lookup, defaults.bind_addr)?,
            http_port: parse_or("HTTP_PORT", &lookup, defaults.http_port)?,
            max_workers: parse_or("MAX_WORKERS", &lookup, defaults.max_workers)?,
            max_retries: parse_or("MAX_RETRIES", &lookup, defaults.max_retries)?,
            max_file_size_mb: parse_or("MAX_FILE_SIZE_MB", &lookup, defaults.max_file_size_mb)?,
            allowed_exts: lookup("ALLOWED_EXTS")
                .map_or(defaults.allowed_exts, |raw| parse_ext_list(&raw)),
            allowed_langs: lookup("ALLOWED_LANGS")
                .map_or(defaults.allowed_langs, |raw| parse_csv(&raw)),
            lang_detect_min_prob: parse_or(
                "LANG_DETECT_MIN_PROB",
                &lookup,
                defaults.lang_detect_min_prob,
            )?,
            enfr_strict_reject: lookup("ENFR_STRICT_REJECT")
                .as_deref()
                .is_some_and(flag_is_truthy),
            gate,
            shutdown_grace_secs: parse_or(
                "SHUTDOWN_GRACE_SECONDS",
                &lookup,
                defaults.shutdown_grace_secs,
            )?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Upload size ceiling in bytes.
    #[must_use]
    pub const fn max_upload_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Whether the given lowercase extension (with leading dot) is accepted.
    #[must_use]
    pub fn extension_allowed(&self, ext: &str) -> bool {
        self.allowed_exts.contains(ext)
    }

    /// Create the storage and log directories if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.storage_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    lookup: impl Fn(&'static str) -> Option<String>,
    default: T,
) -> Result<T> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name,
            value: raw,
            reason: "unparseable",
        }),
    }
}

fn parse_csv(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_ext_list(raw: &str) -> BTreeSet<String> {
    parse_csv(raw)
        .into_iter()
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}

fn flag_is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs
            .iter()
            .map(|(name, value)| (*name, (*value).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let settings = Settings::from_lookup(|_| None).expect("defaults");
        assert_eq!(settings.max_workers, 2);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.max_upload_bytes(), 100 * 1024 * 1024);
        assert!(settings.extension_allowed(".wav"));
        assert!(settings.extension_allowed(".wave"));
        assert!(!settings.extension_allowed(".flac"));
        assert!(!settings.enfr_strict_reject);
        assert_eq!(settings.gate, GateThresholds::default());
    }

    #[test]
    fn env_overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("MAX_WORKERS", "8"),
            ("MAX_FILE_SIZE_MB", "10"),
            ("ALLOWED_EXTS", "wav, .ogg"),
            ("ENFR_STRICT_REJECT", "True"),
            ("LANG_MID_UPPER", "0.85"),
            ("LANG_MIN_TOKENS", "12"),
        ]))
        .expect("settings");
        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.max_upload_bytes(), 10 * 1024 * 1024);
        assert!(settings.extension_allowed(".wav"));
        assert!(settings.extension_allowed(".ogg"));
        assert!(settings.enfr_strict_reject);
        assert!((settings.gate.mid_upper - 0.85).abs() < f64::EPSILON);
        assert_eq!(settings.gate.min_tokens_heuristic, 12);
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let err = Settings::from_lookup(lookup_from(&[("MAX_WORKERS", "many")]))
            .expect_err("should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "MAX_WORKERS",
                ..
            }
        ));
    }

    #[test]
    fn truthy_flags_cover_common_spellings() {
        for value in ["1", "t", "TRUE", "yes", "On"] {
            assert!(flag_is_truthy(value), "{value} should be truthy");
        }
        for value in ["0", "false", "no", ""] {
            assert!(!flag_is_truthy(value), "{value} should be falsey");
        }
    }
}
