use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unknown voice provider {0:?}")]
pub struct ProviderParseError(String);

/// The three supported voice providers. On the wire (webhook paths, stored
/// records, query params) they are `provider_a`, `provider_b`, `provider_c`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    ProviderA,
    ProviderB,
    ProviderC,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::ProviderA, Provider::ProviderB, Provider::ProviderC];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::ProviderA => "provider_a",
            Provider::ProviderB => "provider_b",
            Provider::ProviderC => "provider_c",
        }
    }

    /// The path segment used in webhook routes, e.g. `/webhook/provider-a`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Provider::ProviderA => "provider-a",
            Provider::ProviderB => "provider-b",
            Provider::ProviderC => "provider-c",
        }
    }
}

impl FromStr for Provider {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider_a" | "provider-a" | "a" => Ok(Provider::ProviderA),
            "provider_b" | "provider-b" | "b" => Ok(Provider::ProviderB),
            "provider_c" | "provider-c" | "c" => Ok(Provider::ProviderC),
            other => Err(ProviderParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_wire_forms() {
        assert_eq!("provider-a".parse::<Provider>().unwrap(), Provider::ProviderA);
        assert_eq!("provider_b".parse::<Provider>().unwrap(), Provider::ProviderB);
        assert_eq!("c".parse::<Provider>().unwrap(), Provider::ProviderC);
        assert!("provider-d".parse::<Provider>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Provider::ProviderA).unwrap(),
            "\"provider_a\""
        );
    }
}
