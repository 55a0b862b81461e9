use std::{ops::Deref, str::FromStr, sync::LazyLock};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

static E164_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\+[1-9]\d{6,14}$").unwrap());

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number {0:?} is not a valid E.164 number")]
    Invalid(String),
}

/// A destination phone number in canonical E.164 form.
///
/// Construction always goes through [`Phone::normalize`], so a held value is
/// guaranteed to match `^\+[1-9]\d{6,14}$`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Normalize an inbound phone string to E.164.
    ///
    /// Punctuation and whitespace are stripped. Bare numbers are assumed to
    /// be North American: 10 digits get `+1`, 11 digits starting with `1`
    /// get `+`. Anything that does not land on a valid E.164 number is
    /// rejected. Normalization is idempotent: feeding a canonical number
    /// back in returns it unchanged.
    pub fn normalize(raw: &str) -> Result<Self, PhoneError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Empty);
        }

        let has_plus = trimmed.starts_with('+');
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

        let candidate = if has_plus {
            format!("+{}", digits)
        } else if digits.len() == 10 {
            format!("+1{}", digits)
        } else if digits.len() == 11 && digits.starts_with('1') {
            format!("+{}", digits)
        } else {
            format!("+{}", digits)
        };

        if !E164_RE.is_match(&candidate) {
            return Err(PhoneError::Invalid(raw.to_string()));
        }

        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits without the leading `+`.
    pub fn digits(&self) -> &str {
        &self.0[1..]
    }
}

impl<'de> Deserialize<'de> for Phone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Phone::normalize(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phone::normalize(s)
    }
}

impl AsRef<str> for Phone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Phone {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_nanp_shapes() {
        assert_eq!(
            Phone::normalize("(415) 555-1234").unwrap().as_str(),
            "+14155551234"
        );
        assert_eq!(
            Phone::normalize("1-415-555-1234").unwrap().as_str(),
            "+14155551234"
        );
        assert_eq!(
            Phone::normalize("+1 415 555 1234").unwrap().as_str(),
            "+14155551234"
        );
        assert_eq!(
            Phone::normalize("+442071838750").unwrap().as_str(),
            "+442071838750"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["(415) 555-1234", "+14155551234", "4155551234", "+442071838750"] {
            let once = Phone::normalize(raw).unwrap();
            let twice = Phone::normalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
            assert!(E164_RE.is_match(once.as_str()));
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(Phone::normalize("").is_err());
        assert!(Phone::normalize("not a number").is_err());
        assert!(Phone::normalize("+0123456").is_err());
        assert!(Phone::normalize("12345").is_err());
        // too long for E.164
        assert!(Phone::normalize("+1234567890123456").is_err());
    }
}
