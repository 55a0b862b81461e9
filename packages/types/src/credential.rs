use std::{ops::Deref, str::FromStr, sync::LazyLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A wrapper around a credential string that zeroizes on drop
/// This can be used to store sensitive information such as provider API keys,
/// webhook secrets, or OAuth tokens
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Zeroize, ZeroizeOnDrop, ToSchema)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(credential: String) -> Self {
        Self(credential)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Credential {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Credential {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl FromStr for Credential {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

// credentials never land in logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(***)")
    }
}

static PARTNER_KEY_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^pdy_sk_[0-9a-f]{64}$").unwrap());

/// How many characters of a partner key (including the `pdy_sk_` literal)
/// are treated as the lookup prefix for tenant resolution.
pub const PARTNER_KEY_PREFIX_LEN: usize = 15;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PartnerApiKeyError {
    #[error("partner API key must match pdy_sk_<64 lowercase hex>")]
    Format,
}

/// Partner trigger-API key: the literal prefix `pdy_sk_` followed by 64
/// lowercase hex characters.
#[derive(Serialize, Clone, PartialEq, Eq, Hash, ToSchema)]
#[serde(transparent)]
pub struct PartnerApiKey(Credential);

impl PartnerApiKey {
    pub fn parse(raw: &str) -> Result<Self, PartnerApiKeyError> {
        if !PARTNER_KEY_RE.is_match(raw) {
            return Err(PartnerApiKeyError::Format);
        }
        Ok(Self(Credential::new(raw.to_string())))
    }

    /// Stable lookup prefix used to resolve the owning tenant without
    /// comparing full secrets in the store index.
    pub fn prefix(&self) -> &str {
        &self.0.as_str()[..PARTNER_KEY_PREFIX_LEN]
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl<'de> Deserialize<'de> for PartnerApiKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PartnerApiKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for PartnerApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartnerApiKey({}***)", self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_key_format() {
        let key = format!("pdy_sk_{}", "a1".repeat(32));
        let parsed = PartnerApiKey::parse(&key).unwrap();
        assert_eq!(parsed.as_str(), key);
        assert_eq!(parsed.prefix().len(), PARTNER_KEY_PREFIX_LEN);
        assert!(parsed.prefix().starts_with("pdy_sk_"));
    }

    #[test]
    fn partner_key_rejects_bad_input() {
        assert!(PartnerApiKey::parse("pdy_sk_short").is_err());
        assert!(PartnerApiKey::parse(&format!("pdy_sk_{}", "G1".repeat(32))).is_err());
        assert!(PartnerApiKey::parse(&format!("sk_{}", "a1".repeat(32))).is_err());
    }

    #[test]
    fn debug_never_prints_secret() {
        let key = PartnerApiKey::parse(&format!("pdy_sk_{}", "ab".repeat(32))).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains(&"ab".repeat(32)));

        let cred = Credential::new("super-secret".into());
        assert_eq!(format!("{:?}", cred), "Credential(***)");
    }
}
