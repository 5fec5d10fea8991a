//! Date and time helpers.

use crate::error::CoreError;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const AWARE_FORMATS: [&str; 1] = ["%Y-%m-%dT%H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

const SECS_PER_MIN: u64 = 60;
const SECS_PER_HOUR: u64 = 3600;

/// A datetime parsed from text, with or without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDateTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedDateTime {
    /// Converts to UTC, reading naive values as UTC.
    #[must_use]
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            Self::Aware(dt) => dt.with_timezone(&Utc),
            Self::Naive(dt) => Utc.from_utc_datetime(&dt),
        }
    }
}

/// A duration split into calendar parts. `days` stays zero below 24 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeParts {
    pub days: u64,
    pub hours: u64,
    pub mins: u64,
    pub secs: u64,
}

/// Exponentially growing delays: `min(base * 2^n, max_delay)` for `n` in `0..max_retries`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    attempt: u32,
    max_retries: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt += 1;
        Some(self.base.saturating_mul(factor).min(self.max_delay))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.max_retries - self.attempt.min(self.max_retries)) as usize;
        (left, Some(left))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DateTimeConv;

impl DateTimeConv {
    #[must_use]
    pub fn current_utc_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[must_use]
    pub fn current_local_time() -> DateTime<Local> {
        Local::now()
    }

    /// Parses ISO-like datetimes, with `T` or space separators and optional fraction/offset.
    ///
    /// # Errors
    /// Returns [`CoreError::Validation`] when no supported format matches.
    pub fn str_to_datetime(value: &str) -> Result<ParsedDateTime, CoreError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(ParsedDateTime::Aware(dt));
        }
        for fmt in AWARE_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
                return Ok(ParsedDateTime::Aware(dt));
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Ok(ParsedDateTime::Naive(dt));
            }
        }
        Err(CoreError::validation(format!("Unsupported datetime string: {value}")))
    }

    #[must_use]
    pub const fn exponential_backoff(
        base: Duration,
        max_retries: u32,
        max_delay: Duration,
    ) -> Backoff {
        Backoff { base, max_delay, attempt: 0, max_retries }
    }

    #[must_use]
    pub const fn time_as_parts(seconds: u64) -> TimeParts {
        let mut hours = seconds / SECS_PER_HOUR;
        let rest = seconds % SECS_PER_HOUR;
        let mins = rest / SECS_PER_MIN;
        let secs = rest % SECS_PER_MIN;

        let mut days = 0;
        if hours >= 24 {
            days = hours / 24;
            hours %= 24;
        }
        TimeParts { days, hours, mins, secs }
    }

    /// Seconds from `start` to `end`, both read as UTC.
    #[must_use]
    pub fn time_diff_seconds(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
        let delta = end - start;
        delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / 1e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_str_to_datetime_formats() {
        let aware = DateTimeConv::str_to_datetime("2024-03-01T10:20:30.123+0200").unwrap();
        assert!(matches!(aware, ParsedDateTime::Aware(_)));
        assert_eq!(aware.to_utc().hour(), 8);

        let zulu = DateTimeConv::str_to_datetime("2024-03-01T10:20:30.5Z").unwrap();
        assert!(matches!(zulu, ParsedDateTime::Aware(_)));

        for naive in ["2024-03-01T10:20:30.000001", "2024-03-01 10:20:30.25", "2024-03-01 10:20:30"] {
            let parsed = DateTimeConv::str_to_datetime(naive).unwrap();
            let ParsedDateTime::Naive(dt) = parsed else { panic!("{naive} should be naive") };
            assert_eq!((dt.year(), dt.minute(), dt.second()), (2024, 20, 30));
        }

        assert!(DateTimeConv::str_to_datetime("01/03/2024").is_err());
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let delays: Vec<u64> = DateTimeConv::exponential_backoff(
            Duration::from_secs(5),
            5,
            Duration::from_secs(30),
        )
        .map(|d| d.as_secs())
        .collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);

        assert_eq!(
            DateTimeConv::exponential_backoff(Duration::from_secs(1), 0, Duration::MAX).count(),
            0
        );
    }

    #[test]
    fn test_time_as_parts() {
        assert_eq!(
            DateTimeConv::time_as_parts(3_725),
            TimeParts { days: 0, hours: 1, mins: 2, secs: 5 }
        );
        assert_eq!(
            DateTimeConv::time_as_parts(90_061),
            TimeParts { days: 1, hours: 1, mins: 1, secs: 1 }
        );
    }

    #[test]
    fn test_time_diff_seconds() {
        let start = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let end = NaiveDateTime::parse_from_str("2024-01-01 00:01:30.5", "%Y-%m-%d %H:%M:%S%.f").unwrap();
        assert!((DateTimeConv::time_diff_seconds(start, end) - 90.5).abs() < f64::EPSILON);
        assert!((DateTimeConv::time_diff_seconds(end, start) + 90.5).abs() < f64::EPSILON);
    }
}
