//! Canonical language codes and ISO 639 conversion tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical languages the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    En,
    /// French.
    Fr,
}

/// ISO 639 code families the conversion tables cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoFormat {
    /// Two-letter ISO 639-1 codes.
    Iso639_1,
    /// Bibliographic ISO 639-2 codes.
    Iso639_2B,
    /// Terminological ISO 639-2 codes.
    Iso639_2T,
    /// ISO 639-3 codes.
    Iso639_3,
}

impl Language {
    /// Canonical lowercase code (`en` / `fr`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Fr => "French",
        }
    }

    /// Code for this language in the requested ISO format.
    #[must_use]
    pub const fn iso_code(self, format: IsoFormat) -> &'static str {
        match (self, format) {
            (Self::En, IsoFormat::Iso639_1) => "en",
            (Self::En, _) => "eng",
            (Self::Fr, IsoFormat::Iso639_1) => "fr",
            (Self::Fr, IsoFormat::Iso639_2B) => "fre",
            (Self::Fr, IsoFormat::Iso639_2T | IsoFormat::Iso639_3) => "fra",
        }
    }

    /// Resolve an ISO code in the given format back to a canonical language.
    #[must_use]
    pub fn from_iso_code(code: &str, format: IsoFormat) -> Option<Self> {
        let code = code.to_ascii_lowercase();
        [Self::En, Self::Fr]
            .into_iter()
            .find(|lang| lang.iso_code(format) == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "fr" => Ok(Self::Fr),
            _ => Err(UnknownLanguage {
                code: value.to_string(),
            }),
        }
    }
}

/// Error returned when a code is not a canonical language.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown language code {code:?}")]
pub struct UnknownLanguage {
    /// The code that failed to parse.
    pub code: String,
}

/// Convert a canonical code to the requested ISO format, passing unknown
/// codes through unchanged.
#[must_use]
pub fn to_iso_code(canonical: &str, format: IsoFormat) -> String {
    canonical.parse::<Language>().map_or_else(
        |_| canonical.to_string(),
        |lang| lang.iso_code(format).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_codes_round_trip() {
        assert_eq!("en".parse::<Language>().expect("en"), Language::En);
        assert_eq!("FR".parse::<Language>().expect("fr"), Language::Fr);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn iso_tables_match_both_directions() {
        assert_eq!(Language::Fr.iso_code(IsoFormat::Iso639_2B), "fre");
        assert_eq!(Language::Fr.iso_code(IsoFormat::Iso639_2T), "fra");
        assert_eq!(Language::En.iso_code(IsoFormat::Iso639_3), "eng");
        assert_eq!(
            Language::from_iso_code("fra", IsoFormat::Iso639_3),
            Some(Language::Fr)
        );
        assert_eq!(Language::from_iso_code("deu", IsoFormat::Iso639_3), None);
    }

    #[test]
    fn unknown_codes_pass_through_forward_conversion() {
        assert_eq!(to_iso_code("es", IsoFormat::Iso639_3), "es");
        assert_eq!(to_iso_code("en", IsoFormat::Iso639_2T), "eng");
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(Language::En.label(), "English");
        assert_eq!(Language::Fr.label(), "French");
    }
}
