// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time handling.
//!
//! Every temporal decision in the service reads "now" through a [`Clock`]
//! so tests can pin or advance time without touching stored dates.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};
use std::sync::{Arc, RwLock};

/// Length of the free trial window.
pub const TRIAL_LENGTH_DAYS: i64 = 7;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared clock handle stored in application state.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant (tests and local scenarios).
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    /// Move the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self.instant.write().unwrap_or_else(|e| e.into_inner());
        *guard = instant;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.instant.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Calendar date of `instant` in a fixed civil offset.
///
/// Offsets of a full day or more are not valid civil offsets and fall back to UTC.
pub fn civil_day(instant: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
    let offset = offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    instant.with_timezone(&offset).date_naive()
}

/// True when `now` falls on a later civil day than `previous`.
pub fn crossed_day_boundary(
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
    offset_minutes: i32,
) -> bool {
    civil_day(now, offset_minutes) > civil_day(previous, offset_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const IST_MINUTES: i32 = 330;

    #[test]
    fn test_format_uses_z_suffix() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_utc_rfc3339(t), "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_civil_day_shifts_across_midnight() {
        // 20:00 UTC is 01:30 the next day at +05:30
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(civil_day(t, 0), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(
            civil_day(t, IST_MINUTES),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        assert_eq!(
            civil_day(t, -300),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_civil_day_invalid_offset_is_utc() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        assert_eq!(
            civil_day(t, 24 * 60),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_crossed_day_boundary() {
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap(); // 23:30 IST
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 18, 45, 0).unwrap(); // 00:15 IST
        assert!(crossed_day_boundary(before, after, IST_MINUTES));
        assert!(!crossed_day_boundary(before, after, 0));
        assert!(!crossed_day_boundary(after, before, IST_MINUTES));
    }

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::days(3));
        assert_eq!(clock.now(), start + Duration::days(3));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
