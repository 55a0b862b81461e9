mod area_codes;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use dialplane_types::{CallingWindow, Phone};

pub use area_codes::AREA_CODES;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum TimezoneError {
    #[error("calling window {start_hour}:00-{end_hour}:00 days {days:?} never opens")]
    WindowNeverOpens {
        start_hour: u8,
        end_hour: u8,
        days: Vec<u8>,
    },
}

/// Maps destination numbers to IANA zones and evaluates calling windows in
/// the lead's local time. The table ships with US/CA area codes and can be
/// swapped wholesale for tests or other regions.
#[derive(Clone)]
pub struct TimezoneOracle {
    table: Arc<HashMap<String, Tz>>,
}

impl Default for TimezoneOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneOracle {
    pub fn new() -> Self {
        let table = AREA_CODES
            .iter()
            .filter_map(|(code, zone)| {
                // the embedded table only holds valid zone names; a bad
                // entry is dropped rather than taking the process down
                zone.parse::<Tz>().ok().map(|tz| (code.to_string(), tz))
            })
            .collect();
        Self {
            table: Arc::new(table),
        }
    }

    pub fn with_table(entries: impl IntoIterator<Item = (String, Tz)>) -> Self {
        Self {
            table: Arc::new(entries.into_iter().collect()),
        }
    }

    /// Best-guess IANA zone for a destination number. Only NANP (`+1`)
    /// numbers are covered; everything else gets `None` and the caller
    /// skips the window check.
    pub fn zone_of(&self, phone: &Phone) -> Option<Tz> {
        let digits = phone.digits();
        if !digits.starts_with('1') || digits.len() != 11 {
            return None;
        }
        self.table.get(&digits[1..4]).copied()
    }

    /// Whether `now` falls inside the window in the given zone. A disabled
    /// window is always open.
    pub fn within_window(&self, now: DateTime<Utc>, zone: Tz, window: &CallingWindow) -> bool {
        if !window.enabled {
            return true;
        }

        let local = now.with_timezone(&zone);
        let weekday = local.weekday().num_days_from_sunday() as u8;
        if !window.allows_day(weekday) {
            return false;
        }

        let hour = local.hour() as u8;
        window.start_hour <= hour && hour < window.end_hour
    }

    /// The earliest instant `>= now` at which the window is open,
    /// expressed in UTC. DST is resolved at the candidate instant, not at
    /// scheduling time: an opening hour that is ambiguous during fall-back
    /// takes the earlier occurrence, one erased by spring-forward slides to
    /// the first existing hour after the gap.
    pub fn next_valid_instant(
        &self,
        now: DateTime<Utc>,
        zone: Tz,
        window: &CallingWindow,
    ) -> Result<DateTime<Utc>, TimezoneError> {
        if self.within_window(now, zone, window) {
            return Ok(now);
        }

        if window.days_of_week.is_empty() || window.start_hour >= window.end_hour {
            return Err(TimezoneError::WindowNeverOpens {
                start_hour: window.start_hour,
                end_hour: window.end_hour,
                days: window.days_of_week.clone(),
            });
        }

        let local_now = now.with_timezone(&zone);

        // two weeks covers every day-of-week pattern plus DST oddities
        for day_offset in 0..15 {
            let date = match local_now.date_naive().checked_add_days(chrono::Days::new(day_offset))
            {
                Some(date) => date,
                None => continue,
            };
            let weekday = date.weekday().num_days_from_sunday() as u8;
            if !window.allows_day(weekday) {
                continue;
            }

            for hour in window.start_hour..window.end_hour {
                let opening = match NaiveTime::from_hms_opt(hour as u32, 0, 0) {
                    Some(time) => date.and_time(time),
                    None => continue,
                };
                let candidate = match zone.from_local_datetime(&opening) {
                    LocalResult::Single(dt) => dt,
                    // fall-back repeats the hour; the earlier instant wins
                    LocalResult::Ambiguous(earlier, _) => earlier,
                    // spring-forward erased this hour; try the next one
                    LocalResult::None => continue,
                };
                let candidate = candidate.with_timezone(&Utc);
                if candidate >= now && self.within_window(candidate, zone, window) {
                    return Ok(candidate);
                }
            }
        }

        Err(TimezoneError::WindowNeverOpens {
            start_hour: window.start_hour,
            end_hour: window.end_hour,
            days: window.days_of_week.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> TimezoneOracle {
        TimezoneOracle::new()
    }

    fn weekday_window() -> CallingWindow {
        CallingWindow {
            enabled: true,
            start_hour: 9,
            end_hour: 20,
            days_of_week: vec![1, 2, 3, 4, 5],
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn zone_lookup_covers_nanp_only() {
        let oracle = oracle();
        let sf = Phone::normalize("+14155551234").unwrap();
        assert_eq!(oracle.zone_of(&sf), Some(chrono_tz::America::Los_Angeles));

        let nyc = Phone::normalize("+12125551234").unwrap();
        assert_eq!(oracle.zone_of(&nyc), Some(chrono_tz::America::New_York));

        let uk = Phone::normalize("+442071838750").unwrap();
        assert_eq!(oracle.zone_of(&uk), None);

        // NANP but unmapped area code
        let unknown = Phone::normalize("+19995551234").unwrap();
        assert_eq!(oracle.zone_of(&unknown), None);
    }

    #[test]
    fn disabled_window_is_always_open() {
        let oracle = oracle();
        let window = CallingWindow {
            enabled: false,
            ..weekday_window()
        };
        // Saturday 3am pacific
        let now = utc("2026-07-18T10:00:00Z");
        assert!(oracle.within_window(now, chrono_tz::America::Los_Angeles, &window));
    }

    #[test]
    fn saturday_trigger_schedules_monday_opening() {
        let oracle = oracle();
        let window = weekday_window();
        let zone = chrono_tz::America::Los_Angeles;

        // Sat 2026-07-18 10:00 PDT == 17:00 UTC
        let now = utc("2026-07-18T17:00:00Z");
        assert!(!oracle.within_window(now, zone, &window));

        let next = oracle.next_valid_instant(now, zone, &window).unwrap();
        // Mon 2026-07-20 09:00 PDT == 16:00 UTC
        assert_eq!(next, utc("2026-07-20T16:00:00Z"));
    }

    #[test]
    fn open_window_returns_now() {
        let oracle = oracle();
        let window = weekday_window();
        let zone = chrono_tz::America::Los_Angeles;

        // Tue 11:00 PDT
        let now = utc("2026-07-21T18:00:00Z");
        assert!(oracle.within_window(now, zone, &window));
        assert_eq!(oracle.next_valid_instant(now, zone, &window).unwrap(), now);
    }

    #[test]
    fn boundary_property_holds() {
        let oracle = oracle();
        let window = weekday_window();
        let zone = chrono_tz::America::New_York;

        for start in [
            "2026-07-18T02:00:00Z", // weekend
            "2026-07-20T01:00:00Z", // Sun night eastern
            "2026-07-21T03:30:00Z", // Mon 11:30pm eastern
        ] {
            let now = utc(start);
            let next = oracle.next_valid_instant(now, zone, &window).unwrap();
            assert!(oracle.within_window(next, zone, &window));
            let just_before = next - Duration::minutes(1);
            if just_before >= now {
                assert!(!oracle.within_window(just_before, zone, &window));
            }
        }
    }

    #[test]
    fn spring_forward_gap_slides_to_next_hour() {
        let oracle = oracle();
        // US DST starts 2026-03-08: 02:00 EST jumps to 03:00 EDT.
        // A Sunday window opening at 2am cannot exist that day.
        let window = CallingWindow {
            enabled: true,
            start_hour: 2,
            end_hour: 6,
            days_of_week: vec![0],
        };
        let zone = chrono_tz::America::New_York;

        // Sunday 2026-03-08 00:30 EST == 05:30 UTC
        let now = utc("2026-03-08T05:30:00Z");
        let next = oracle.next_valid_instant(now, zone, &window).unwrap();
        // first existing opening hour is 03:00 EDT == 07:00 UTC
        assert_eq!(next, utc("2026-03-08T07:00:00Z"));
        assert!(oracle.within_window(next, zone, &window));
    }

    #[test]
    fn fall_back_ambiguity_prefers_earlier() {
        let oracle = oracle();
        // US DST ends 2026-11-01: 02:00 EDT falls back to 01:00 EST,
        // so 01:00 local happens twice.
        let window = CallingWindow {
            enabled: true,
            start_hour: 1,
            end_hour: 4,
            days_of_week: vec![0],
        };
        let zone = chrono_tz::America::New_York;

        // Sunday 2026-11-01 00:30 EDT == 04:30 UTC
        let now = utc("2026-11-01T04:30:00Z");
        let next = oracle.next_valid_instant(now, zone, &window).unwrap();
        // earlier occurrence of 01:00 is EDT (UTC-4) == 05:00 UTC
        assert_eq!(next, utc("2026-11-01T05:00:00Z"));
    }

    #[test]
    fn impossible_window_errors() {
        let oracle = oracle();
        let window = CallingWindow {
            enabled: true,
            start_hour: 9,
            end_hour: 9,
            days_of_week: vec![1],
        };
        let err = oracle
            .next_valid_instant(
                utc("2026-07-18T17:00:00Z"),
                chrono_tz::America::Chicago,
                &window,
            )
            .unwrap_err();
        assert!(matches!(err, TimezoneError::WindowNeverOpens { .. }));
    }
}
