use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Nanoseconds since the unix epoch.
#[repr(transparent)]
#[derive(
    Debug, Hash, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ToSchema,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Result<Self> {
        let nanos = dt
            .timestamp_nanos_opt()
            .ok_or_else(|| anyhow!("Invalid timestamp"))?;

        if nanos < 0 {
            return Err(anyhow!("Timestamp cannot represent dates before 1970"));
        }

        Ok(Timestamp(nanos as u64))
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0 as i64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        // dates before 1970 never occur in call records, clamp instead of failing
        Self(dt.timestamp_nanos_opt().unwrap_or(0).max(0) as u64)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_datetime().to_rfc3339())
    }
}
