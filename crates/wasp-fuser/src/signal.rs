//! Input normalization

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized value of a motion or door input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputSignal {
    /// Motion detected, door open
    Active,
    /// No motion, door closed
    Inactive,
    /// Absent, unknown, unavailable or unrecognized
    #[default]
    Unknown,
}

impl fmt::Display for InputSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputSignal::Active => "active",
            InputSignal::Inactive => "inactive",
            InputSignal::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Which raw state values count as active or inactive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vocabulary {
    /// `on` / `off` only
    Strict,
    /// Binary-sensor style tokens (`on`, `home`, `true`, `open`, ...)
    #[default]
    Binary,
}

const STRICT_ACTIVE: &[&str] = &["on"];
const STRICT_INACTIVE: &[&str] = &["off"];
const BINARY_ACTIVE: &[&str] = &["on", "home", "true", "1", "open", "detected"];
const BINARY_INACTIVE: &[&str] = &["off", "not_home", "away", "false", "0", "closed", "clear"];

impl Vocabulary {
    /// Map a raw state value to a signal
    ///
    /// `None`, `unknown` and `unavailable` are Unknown, and so is any token
    /// outside the vocabulary. Matching ignores ASCII case.
    pub fn normalize(self, raw: Option<&str>) -> InputSignal {
        let Some(raw) = raw.map(str::trim) else {
            return InputSignal::Unknown;
        };

        let (active, inactive) = match self {
            Vocabulary::Strict => (STRICT_ACTIVE, STRICT_INACTIVE),
            Vocabulary::Binary => (BINARY_ACTIVE, BINARY_INACTIVE),
        };

        if active.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
            InputSignal::Active
        } else if inactive.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
            InputSignal::Inactive
        } else {
            InputSignal::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_sentinels_are_unknown() {
        for vocab in [Vocabulary::Strict, Vocabulary::Binary] {
            assert_eq!(vocab.normalize(None), InputSignal::Unknown);
            assert_eq!(vocab.normalize(Some("unknown")), InputSignal::Unknown);
            assert_eq!(vocab.normalize(Some("unavailable")), InputSignal::Unknown);
            assert_eq!(vocab.normalize(Some("")), InputSignal::Unknown);
        }
    }

    #[test]
    fn test_strict_vocabulary() {
        let vocab = Vocabulary::Strict;
        assert_eq!(vocab.normalize(Some("on")), InputSignal::Active);
        assert_eq!(vocab.normalize(Some("OFF")), InputSignal::Inactive);
        assert_eq!(vocab.normalize(Some("open")), InputSignal::Unknown);
        assert_eq!(vocab.normalize(Some("home")), InputSignal::Unknown);
    }

    #[test]
    fn test_binary_vocabulary() {
        let vocab = Vocabulary::Binary;
        for raw in ["on", "home", "true", "1", "open", "Detected"] {
            assert_eq!(vocab.normalize(Some(raw)), InputSignal::Active, "{raw}");
        }
        for raw in ["off", "not_home", "away", "false", "0", "closed", "clear"] {
            assert_eq!(vocab.normalize(Some(raw)), InputSignal::Inactive, "{raw}");
        }
        assert_eq!(vocab.normalize(Some("idle")), InputSignal::Unknown);
    }

    #[test]
    fn test_vocabulary_serde() {
        let vocab: Vocabulary = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(vocab, Vocabulary::Strict);
        assert_eq!(Vocabulary::default(), Vocabulary::Binary);
    }
}
