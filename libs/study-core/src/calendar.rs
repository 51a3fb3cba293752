//! Local calendar-day bucketing for client timezone offsets.
//!
//! Daily counters and streaks are keyed by the learner's *local* date, which
//! is derived from a UTC instant and the offset the client reports.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

const MIN_OFFSET_HOURS: f64 = -12.0;
const MAX_OFFSET_HOURS: f64 = 14.0;

/// A validated UTC offset as reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TimezoneOffset {
    seconds: i32,
}

impl TimezoneOffset {
    pub const UTC: Self = Self { seconds: 0 };

    /// Create from fractional hours (e.g. `5.5` for UTC+05:30).
    pub fn from_hours(hours: f64) -> Result<Self> {
        if !hours.is_finite() || !(MIN_OFFSET_HOURS..=MAX_OFFSET_HOURS).contains(&hours) {
            return Err(ScheduleError::InvalidTimezoneOffset(hours));
        }
        Ok(Self {
            seconds: (hours * 3600.0).round() as i32,
        })
    }

    pub fn seconds(&self) -> i32 {
        self.seconds
    }

    pub fn hours(&self) -> f64 {
        self.seconds as f64 / 3600.0
    }

    fn fixed(&self) -> FixedOffset {
        FixedOffset::east_opt(self.seconds).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for TimezoneOffset {
    fn default() -> Self {
        Self::UTC
    }
}

impl TryFrom<f64> for TimezoneOffset {
    type Error = ScheduleError;

    fn try_from(hours: f64) -> Result<Self> {
        Self::from_hours(hours)
    }
}

impl From<TimezoneOffset> for f64 {
    fn from(offset: TimezoneOffset) -> Self {
        offset.hours()
    }
}

/// Local calendar date of `instant` for a client at `offset`.
pub fn local_date(instant: DateTime<Utc>, offset: TimezoneOffset) -> NaiveDate {
    instant.with_timezone(&offset.fixed()).date_naive()
}

/// UTC half-open range `[start, end)` covering the local `date` at `offset`.
pub fn local_day_bounds(date: NaiveDate, offset: TimezoneOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(offset.seconds() as i64);
    (start, start + Duration::days(1))
}

/// Format a local date as the YYYY-MM-DD key used for daily buckets.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
