use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::db::{handles, Db};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded for {scope}: {kind} budget of {limit} spent")]
    Exceeded {
        scope: String,
        kind: &'static str,
        limit: i64,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimits {
    pub burst_per_minute: i64,
    pub per_day: i64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            burst_per_minute: 10,
            per_day: 200,
        }
    }
}

/// Windowed per-scope budgets over the shared counter table. Counters are
/// keyed by scope + window start, so a new window starts at zero without an
/// explicit reset sweep; stale keys are just never read again.
#[derive(Clone)]
pub struct RateLimiter {
    db: Db,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(db: Db, limits: RateLimits) -> Self {
        Self { db, limits }
    }

    /// Spend one unit of budget for `scope` (typically a tenant id).
    /// Both the minute and day budgets must have room; a denied call still
    /// burns nothing durable since the minute window rolls over.
    pub fn check(&self, scope: &str, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        let minute_key = format!("{}:{}", scope, now.format("%Y-%m-%dT%H:%M"));
        let day_key = format!("{}:{}", scope, now.format("%Y-%m-%d"));

        let minute = self
            .db
            .increment(&handles::RATE_COUNTERS, minute_key, 1)
            .unwrap_or(i64::MAX);
        if minute > self.limits.burst_per_minute {
            return Err(RateLimitError::Exceeded {
                scope: scope.to_string(),
                kind: "burst",
                limit: self.limits.burst_per_minute,
            });
        }

        let day = self
            .db
            .increment(&handles::RATE_COUNTERS, day_key, 1)
            .unwrap_or(i64::MAX);
        if day > self.limits.per_day {
            return Err(RateLimitError::Exceeded {
                scope: scope.to_string(),
                kind: "daily",
                limit: self.limits.per_day,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn burst_budget_caps_within_a_minute() {
        let limiter = RateLimiter::new(
            Db::new().unwrap(),
            RateLimits {
                burst_per_minute: 3,
                per_day: 100,
            },
        );
        let now = at("2026-05-01T10:00:30Z");

        for _ in 0..3 {
            limiter.check("tenant-1", now).unwrap();
        }
        assert!(matches!(
            limiter.check("tenant-1", now),
            Err(RateLimitError::Exceeded { kind: "burst", .. })
        ));

        // next minute opens a fresh window
        limiter.check("tenant-1", at("2026-05-01T10:01:00Z")).unwrap();
    }

    #[test]
    fn daily_budget_spans_minutes() {
        let limiter = RateLimiter::new(
            Db::new().unwrap(),
            RateLimits {
                burst_per_minute: 100,
                per_day: 2,
            },
        );

        limiter.check("tenant-1", at("2026-05-01T01:00:00Z")).unwrap();
        limiter.check("tenant-1", at("2026-05-01T02:00:00Z")).unwrap();
        assert!(matches!(
            limiter.check("tenant-1", at("2026-05-01T03:00:00Z")),
            Err(RateLimitError::Exceeded { kind: "daily", .. })
        ));

        // a different scope is unaffected
        limiter.check("tenant-2", at("2026-05-01T03:00:00Z")).unwrap();
    }
}
