use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

/// The one source of "now" for the whole system. Every window evaluation
/// and scheduler decision reads time through this, so tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A pinnable clock for tests.
#[derive(Clone, Default)]
pub struct FixedClock {
    now: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(Some(now))),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap() = Some(now);
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap();
        let current = guard.unwrap_or_else(Utc::now);
        *guard = Some(current + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().unwrap().unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_pins_and_advances() {
        let start = "2026-06-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = FixedClock::at(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));

        let later = "2026-06-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
