//! Plate text normalisation, format heuristics and acceptance thresholds.

use regex::Regex;

use crate::error::ConfigError;

/// UK current format, then generic letter/digit block layouts.
pub const DEFAULT_REGIONAL_PATTERNS: &[&str] = &[
    r"^[A-Z]{2}[0-9]{2}[A-Z]{3}$",
    r"^[A-Z]{1,3}[0-9]{2,4}[A-Z]{0,2}$",
    r"^[0-9]{1,3}[A-Z]{2,3}[0-9]{1,4}$",
];

const MIN_PLATE_LEN: usize = 5;
/// Minimum OCR confidence for 6-7 character text matching a regional pattern.
const STRICT_MIN_CONFIDENCE: f32 = 0.03;
/// Minimum for any other 5-8 character text.
const MEDIUM_MIN_CONFIDENCE: f32 = 0.07;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.12;

/// Uppercase and keep ASCII alphanumerics only.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone)]
pub struct PlateFormat {
    patterns: Vec<Regex>,
}

impl PlateFormat {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| ConfigError::invalid("regional_patterns", e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matches one of the regional patterns.
    pub fn is_strict(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// At least 5 characters, and either 2+ letters with 2+ digits or a
    /// regional match.
    pub fn is_plausible(&self, text: &str) -> bool {
        if text.len() < MIN_PLATE_LEN {
            return false;
        }
        let letters = text.chars().filter(char::is_ascii_alphabetic).count();
        let digits = text.chars().filter(char::is_ascii_digit).count();
        (letters >= 2 && digits >= 2) || self.is_strict(text)
    }

    /// Length-dependent confidence floor.
    pub fn min_confidence(&self, text: &str) -> f32 {
        match text.len() {
            6..=7 if self.is_strict(text) => STRICT_MIN_CONFIDENCE,
            5..=8 => MEDIUM_MIN_CONFIDENCE,
            _ => DEFAULT_MIN_CONFIDENCE,
        }
    }

    /// Whether normalised `text` read with `confidence` may be locked.
    pub fn accepts(&self, text: &str, confidence: f32) -> bool {
        self.is_plausible(text) && confidence > self.min_confidence(text)
    }
}

impl Default for PlateFormat {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_REGIONAL_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}
