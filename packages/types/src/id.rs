use serde::{Deserialize, Deserializer, Serialize};
use std::{ops::Deref, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum IdError {
    #[error("ID must be between 3 and 36 characters")]
    Length,
    #[error("ID must be lowercase alphanumeric")]
    Char,
}

/// Macro for generating new ID like types
macro_rules! new_string_id_type {
    ($type_name:ident) => {
        /// It is a string, but with some strict validation rules. It must be lowercase alphanumeric: `[a-z0-9-_]{3,36}`
        #[derive(
            Serialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $type_name(String);

        impl $type_name {
            // take Into<String> instead of ToString so we benefit from zero-cost conversions for common cases
            pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
                let id = id.into();

                if id.len() < 3 || id.len() > 36 {
                    return Err(IdError::Length);
                }
                if !id
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_numeric() || c == '_' || c == '-')
                {
                    return Err(IdError::Char);
                }
                Ok(Self(id))
            }

            /// A fresh random id. Hyphenated uuid-v4 is 36 lowercase chars,
            /// which always satisfies the validation rules.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl<'de> Deserialize<'de> for $type_name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $type_name::new(s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $type_name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $type_name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<&str> for $type_name {
            type Error = IdError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                $type_name::new(s)
            }
        }

        impl FromStr for $type_name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $type_name::new(s)
            }
        }
    };
}

new_string_id_type!(TenantId);
new_string_id_type!(ClientId);
new_string_id_type!(AgentId);
new_string_id_type!(CallId);
new_string_id_type!(ScheduledCallId);
new_string_id_type!(ExperimentId);
new_string_id_type!(VariantId);
new_string_id_type!(WorkflowId);
new_string_id_type!(TriggerLogId);
new_string_id_type!(ExecutionLogId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation() {
        assert!(TenantId::new("tenant-1").is_ok());
        assert!(TenantId::new("a_b-c123").is_ok());
        assert_eq!(TenantId::new("ab"), Err(IdError::Length));
        assert_eq!(
            TenantId::new("a".repeat(37)),
            Err(IdError::Length)
        );
        assert_eq!(TenantId::new("Tenant"), Err(IdError::Char));
        assert_eq!(TenantId::new("ten ant"), Err(IdError::Char));
    }

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..10 {
            let id = CallId::generate();
            assert!(CallId::new(id.as_ref()).is_ok());
        }
    }

    #[test]
    fn deserialize_rejects_invalid() {
        let ok: Result<AgentId, _> = serde_json::from_str("\"agent-7\"");
        assert!(ok.is_ok());
        let bad: Result<AgentId, _> = serde_json::from_str("\"NOPE\"");
        assert!(bad.is_err());
    }
}
