//! Locale-aware numeric parsing.
//!
//! Instrument software writes decimals with the separators of the operator's
//! locale. Values that do not parse as numbers are handed back as trimmed text
//! so that callers can classify the column as categorical for that row.

use crate::error::{ExtractError, Result};
use crate::models::Scalar;

const SPACE_GROUPS: &[char] = &['\u{202f}', '\u{a0}', ' '];
const DOT_GROUPS: &[char] = &['.'];
const COMMA_GROUPS: &[char] = &[','];
const APOSTROPHE_GROUPS: &[char] = &['\u{2019}', '\''];

/// Territory-specific separators, checked before the language table
const TERRITORIES: &[(&str, char, &[char])] = &[
    ("de_CH", '.', APOSTROPHE_GROUPS),
    ("fr_CH", '.', APOSTROPHE_GROUPS),
    ("it_CH", '.', APOSTROPHE_GROUPS),
    ("de_LI", '.', APOSTROPHE_GROUPS),
    ("pt_PT", ',', SPACE_GROUPS),
    ("es_MX", '.', COMMA_GROUPS),
    ("en_ZA", ',', SPACE_GROUPS),
];

const LANGUAGES: &[(&str, char, &[char])] = &[
    ("C", '.', COMMA_GROUPS),
    ("POSIX", '.', COMMA_GROUPS),
    ("en", '.', COMMA_GROUPS),
    ("ja", '.', COMMA_GROUPS),
    ("zh", '.', COMMA_GROUPS),
    ("ko", '.', COMMA_GROUPS),
    ("he", '.', COMMA_GROUPS),
    ("de", ',', DOT_GROUPS),
    ("nl", ',', DOT_GROUPS),
    ("it", ',', DOT_GROUPS),
    ("es", ',', DOT_GROUPS),
    ("pt", ',', DOT_GROUPS),
    ("da", ',', DOT_GROUPS),
    ("id", ',', DOT_GROUPS),
    ("tr", ',', DOT_GROUPS),
    ("el", ',', DOT_GROUPS),
    ("ro", ',', DOT_GROUPS),
    ("fr", ',', SPACE_GROUPS),
    ("cs", ',', SPACE_GROUPS),
    ("sk", ',', SPACE_GROUPS),
    ("pl", ',', SPACE_GROUPS),
    ("sv", ',', SPACE_GROUPS),
    ("fi", ',', SPACE_GROUPS),
    ("nb", ',', SPACE_GROUPS),
    ("no", ',', SPACE_GROUPS),
    ("ru", ',', SPACE_GROUPS),
    ("uk", ',', SPACE_GROUPS),
    ("hu", ',', SPACE_GROUPS),
    ("bg", ',', SPACE_GROUPS),
];

/// Decimal and grouping separators of one locale
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLocale {
    id: String,
    decimal: char,
    groups: &'static [char],
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self {
            id: "en_US".to_string(),
            decimal: '.',
            groups: COMMA_GROUPS,
        }
    }
}

impl NumberLocale {
    /// Resolve a locale identifier such as `en_US`, `de-DE` or `fr_FR.UTF-8`
    pub fn from_id(id: &str) -> Result<Self> {
        let normalized = normalize_id(id);
        let language = normalized.split('_').next().unwrap_or_default();

        let found = TERRITORIES
            .iter()
            .find(|(name, _, _)| *name == normalized)
            .or_else(|| LANGUAGES.iter().find(|(name, _, _)| *name == language));

        match found {
            Some((_, decimal, groups)) => Ok(Self {
                id: normalized,
                decimal: *decimal,
                groups,
            }),
            None => Err(ExtractError::configuration(format!(
                "Unsupported locale '{}'",
                id
            ))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal
    }

    /// Parse a decimal string, returning the trimmed input as text on failure
    pub fn parse(&self, raw: &str) -> Scalar {
        let trimmed = raw.trim();
        match self.parse_f64(trimmed) {
            Some(value) => Scalar::Float(value),
            None => Scalar::Text(trimmed.to_string()),
        }
    }

    /// Parse a value expected to be integral.
    ///
    /// Integral decimals become `Int`; fractional ones stay `Float`, text stays `Text`.
    pub fn parse_int(&self, raw: &str) -> Scalar {
        match self.parse(raw) {
            Scalar::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Scalar::Int(v as i64)
            }
            other => other,
        }
    }

    fn parse_f64(&self, trimmed: &str) -> Option<f64> {
        if trimmed.is_empty() {
            return None;
        }
        let normalized: String = trimmed
            .chars()
            .filter(|c| !self.groups.contains(c))
            .map(|c| if c == self.decimal { '.' } else { c })
            .collect();
        normalized.parse::<f64>().ok()
    }
}

fn normalize_id(id: &str) -> String {
    let base = id
        .trim()
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .replace('-', "_");
    match base.split_once('_') {
        Some((language, territory)) => {
            format!("{}_{}", language.to_lowercase(), territory.to_uppercase())
        }
        None if base == "C" || base == "POSIX" => base,
        None => base.to_lowercase(),
    }
}
