//! Transcript tokenization, stop-word ratios, and the music-only classifier.

use once_cell::sync::Lazy;
use regex::Regex;

/// English function words used by the mid-zone heuristic.
pub(crate) const EN_STOPWORDS: &[&str] = &[
    "the", "and", "to", "of", "in", "you", "your", "for", "is", "on", "it", "that", "with", "this",
    "as", "at", "be", "are", "we", "our", "us",
];

/// French function words used by the mid-zone heuristic.
pub(crate) const FR_STOPWORDS: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "et", "ou", "mais", "que", "qui", "pour", "avec", "sur",
    "pas", "ce", "cette", "est", "sont", "je", "tu", "il", "elle", "nous", "vous", "ils", "elles",
];

/// Tokens that positively identify music content.
pub(crate) const MUSIC_KEYWORDS: &[&str] = &["music", "musique"];

/// Unicode markers transcription models emit around music passages.
const MUSIC_UNICODE_MARKERS: &[char] = &['♪', '♫', '♩', '♬', '♭', '♯'];

/// Tokens that commonly pad a music annotation without changing its meaning.
const MUSIC_FILLER_TOKENS: &[&str] = &[
    "background",
    "bg",
    "only",
    "instrumental",
    "ambience",
    "ambiance",
    "ambient",
    "soundtrack",
    "track",
    "outro",
    "intro",
    "playing",
    "play",
    "song",
    "soft",
    "theme",
    "jingle",
    "de",
    "du",
    "fond",
];

const BRACKET_PAIRS: &[(char, char)] = &[('[', ']'), ('(', ')'), ('{', '}'), ('<', '>')];

static TOKEN_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w']+").expect("token split regex compiles"));

/// Split text on whitespace/punctuation into lowercase tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    TOKEN_SPLIT_RE
        .split(&text.to_lowercase())
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Fraction of tokens that appear in the stop-word set.
#[must_use]
pub fn stopword_ratio(tokens: &[String], stopwords: &[&str]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens
        .iter()
        .filter(|token| stopwords.contains(&token.as_str()))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = hits as f64 / tokens.len() as f64;
    ratio
}

/// Keep only the first `n` whitespace-delimited tokens.
#[must_use]
pub fn truncate_to_words(text: &str, n: usize) -> String {
    text.split_whitespace()
        .take(n)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove matching outer brackets, one layer at a time.
fn strip_outer_brackets(text: &str) -> String {
    let mut stripped = text.trim().to_string();
    loop {
        let chars: Vec<char> = stripped.chars().collect();
        if chars.len() < 2 {
            break;
        }
        let Some((_, closing)) = BRACKET_PAIRS
            .iter()
            .find(|(open, _)| *open == chars[0])
            .copied()
        else {
            break;
        };
        if *chars.last().expect("len checked") != closing {
            break;
        }
        stripped = chars[1..chars.len() - 1].iter().collect::<String>();
        stripped = stripped.trim().to_string();
    }
    stripped
}

/// Whether the transcript represents background music only.
///
/// After normalizing Unicode music markers to the token `music`, stripping
/// outer brackets, and lowercasing, every token must be a music keyword or a
/// filler; once fillers are removed, either 1–2 pure keywords remain or every
/// remaining token is a keyword.
#[must_use]
pub fn is_music_only_transcript(text: &str) -> bool {
    let working = text.trim();
    if working.is_empty() {
        return false;
    }

    let mut working = working.to_string();
    for marker in MUSIC_UNICODE_MARKERS {
        if working.contains(*marker) {
            working = working.replace(*marker, " music ");
        }
    }

    let working = strip_outer_brackets(&working.to_lowercase());
    if working.is_empty() {
        return false;
    }

    let tokens = tokenize(&working);
    if tokens.is_empty() {
        return false;
    }

    let is_keyword = |token: &str| MUSIC_KEYWORDS.contains(&token);
    let is_filler = |token: &str| MUSIC_FILLER_TOKENS.contains(&token);

    if !tokens
        .iter()
        .all(|token| is_keyword(token) || is_filler(token))
    {
        return false;
    }

    let filtered: Vec<&String> = tokens.iter().filter(|token| !is_filler(token)).collect();
    if filtered.is_empty() {
        return false;
    }
    if filtered.len() <= 2 && filtered.iter().all(|token| is_keyword(token)) {
        return true;
    }
    filtered.iter().all(|token| is_keyword(token))
}
