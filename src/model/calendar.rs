//! Calendar bucketing.
//!
//! Truncates timestamps to a display granularity in a display timezone. The
//! shift from storage time to display time happens once, on the raw stored
//! instant, so a value is never localized twice.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::EngineError;
use crate::model::types::StorageMode;
use crate::value::Value;

/// Upper bound on buckets produced by a single range enumeration.
pub const MAX_RANGE_BUCKETS: usize = 100_000;

/// Bucket granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Hour,
    Day,
    Weekday,
    WeekdayHour,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn name(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Weekday => "weekday",
            Granularity::WeekdayHour => "weekday+hour",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    /// Whether bucket keys form a timeline (weekday buckets wrap around).
    pub fn is_chronological(&self) -> bool {
        !matches!(self, Granularity::Weekday | Granularity::WeekdayHour)
    }

    /// Format a display-local wall-clock time as a bucket key.
    pub fn format(&self, local: NaiveDateTime) -> String {
        match self {
            Granularity::Hour => local.format("%Y-%m-%d %H").to_string(),
            Granularity::Day => local.format("%Y-%m-%d").to_string(),
            Granularity::Weekday => local.format("%A").to_string(),
            Granularity::WeekdayHour => local.format("%A %H").to_string(),
            Granularity::Month => local.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{} Q{}", local.year(), quarter_of(local.month())),
            Granularity::Year => local.format("%Y").to_string(),
        }
    }

    /// Parse a bucket key back to the start of its bucket.
    pub fn parse_key(&self, key: &str) -> Option<NaiveDateTime> {
        let date = match self {
            Granularity::Hour => {
                return NaiveDateTime::parse_from_str(&format!("{}:00", key), "%Y-%m-%d %H:%M")
                    .ok()
            }
            Granularity::Day => NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()?,
            Granularity::Month => NaiveDate::parse_from_str(&format!("{}-01", key), "%Y-%m-%d").ok()?,
            Granularity::Quarter => {
                let (year, quarter) = key.split_once(" Q")?;
                let quarter: u32 = quarter.parse().ok()?;
                if !(1..=4).contains(&quarter) {
                    return None;
                }
                NaiveDate::from_ymd_opt(year.parse().ok()?, (quarter - 1) * 3 + 1, 1)?
            }
            Granularity::Year => NaiveDate::from_ymd_opt(key.parse().ok()?, 1, 1)?,
            Granularity::Weekday | Granularity::WeekdayHour => return None,
        };
        date.and_hms_opt(0, 0, 0)
    }

    /// Start of the bucket following the one starting at `start`.
    pub fn next(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Granularity::Hour => start.checked_add_signed(TimeDelta::hours(1)),
            Granularity::Day => start.checked_add_signed(TimeDelta::days(1)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
            Granularity::Quarter => start.checked_add_months(Months::new(3)),
            Granularity::Year => start.checked_add_months(Months::new(12)),
            Granularity::Weekday | Granularity::WeekdayHour => None,
        }
    }

    /// Every bucket key from `first` to `last`, inclusive.
    ///
    /// Returns `None` for non-chronological granularities or unparseable keys.
    pub fn range_keys(&self, first: &str, last: &str) -> Option<Vec<String>> {
        let mut current = self.parse_key(first)?;
        let end = self.parse_key(last)?;

        let mut keys = Vec::new();
        while current <= end {
            if keys.len() >= MAX_RANGE_BUCKETS {
                tracing::warn!(granularity = self.name(), "bucket range truncated");
                break;
            }
            keys.push(self.format(current));
            current = match self.next(current) {
                Some(next) => next,
                None => break,
            };
        }
        Some(keys)
    }
}

fn quarter_of(month: u32) -> u32 {
    (month + 2) / 3
}

impl FromStr for Granularity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            "weekday" => Ok(Granularity::Weekday),
            "weekdayhour" | "weekday+hour" | "weekday_hour" | "weekday hour" => {
                Ok(Granularity::WeekdayHour)
            }
            "month" => Ok(Granularity::Month),
            "quarter" => Ok(Granularity::Quarter),
            "year" => Ok(Granularity::Year),
            _ => Err(EngineError::UnsupportedGranularity(s.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Bucketer
// =============================================================================

/// Maps stored timestamps to bucket keys in a display timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucketer {
    timezone: Tz,
    storage: StorageMode,
    offset_seconds: i64,
}

impl Bucketer {
    pub fn new(timezone: Tz, storage: StorageMode, offset_seconds: i64) -> Self {
        Self {
            timezone,
            storage,
            offset_seconds,
        }
    }

    /// Bucketer for a storage mode at a given moment.
    ///
    /// Aware storage needs no extra offset. Naive storage is shifted by the
    /// display timezone's UTC offset at `now`.
    pub fn for_storage(timezone: Tz, storage: StorageMode, now: DateTime<Utc>) -> Self {
        let offset_seconds = match storage {
            StorageMode::Aware => 0,
            StorageMode::Naive => utc_offset_seconds(&timezone, now),
        };
        Self::new(timezone, storage, offset_seconds)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    pub fn offset_seconds(&self) -> i64 {
        self.offset_seconds
    }

    /// Display-local wall-clock time for a stored instant.
    pub fn local(&self, stored: DateTime<Utc>) -> NaiveDateTime {
        let shifted = stored + TimeDelta::seconds(self.offset_seconds);
        match self.storage {
            StorageMode::Aware => shifted.with_timezone(&self.timezone).naive_local(),
            StorageMode::Naive => shifted.naive_utc(),
        }
    }

    pub fn bucket(&self, stored: DateTime<Utc>, granularity: Granularity) -> String {
        granularity.format(self.local(stored))
    }

    /// Bucket a row value. Non-temporal values bucket to NULL.
    pub fn bucket_value(&self, value: &Value, granularity: Granularity) -> Value {
        match value.as_utc() {
            Some(stored) => Value::String(self.bucket(stored, granularity)),
            None => Value::Null,
        }
    }
}

impl fmt::Display for Bucketer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:+}s",
            self.timezone.name(),
            self.storage,
            self.offset_seconds
        )
    }
}

/// UTC offset of `timezone` at `at`, in seconds.
pub fn utc_offset_seconds(timezone: &Tz, at: DateTime<Utc>) -> i64 {
    timezone
        .offset_from_utc_datetime(&at.naive_utc())
        .fix()
        .local_minus_utc() as i64
}
