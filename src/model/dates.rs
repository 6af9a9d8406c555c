//! Relative dates and period filters.
//!
//! A delta such as `-7d`, `2m` or `-y` names a whole day, month or year
//! relative to "now" in the display timezone. Malformed deltas are ignored:
//! the bound they would have set stays unset.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::types::StorageMode;
use crate::value::{parse_temporal, Value};

static DELTA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<amount>-?\d*)(?P<unit>[dmy])$").unwrap());

/// Unit of a relative date delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaUnit {
    Day,
    Month,
    Year,
}

/// A parsed relative date delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub amount: i32,
    pub unit: DeltaUnit,
}

impl Delta {
    pub fn new(amount: i32, unit: DeltaUnit) -> Self {
        Self { amount, unit }
    }

    /// Parse `sign? digits? unit`. A missing magnitude means 1.
    ///
    /// Returns `None` for anything that does not match.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = DELTA_PATTERN.captures(s)?;
        let amount = match &caps["amount"] {
            "" => 1,
            "-" => -1,
            digits => digits.parse().ok()?,
        };
        let unit = match &caps["unit"] {
            "d" => DeltaUnit::Day,
            "m" => DeltaUnit::Month,
            _ => DeltaUnit::Year,
        };
        Some(Self { amount, unit })
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves deltas against a fixed "now" in a display timezone.
#[derive(Debug, Clone, Copy)]
pub struct DateResolver {
    timezone: Tz,
    now: DateTime<Utc>,
    storage: StorageMode,
}

impl DateResolver {
    pub fn new(timezone: Tz, now: DateTime<Utc>, storage: StorageMode) -> Self {
        Self {
            timezone,
            now,
            storage,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Today's date in the display timezone.
    pub fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.timezone).date_naive()
    }

    /// First and last local instant of the period a delta names.
    pub fn local_range(&self, delta: &Delta) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let today = self.today();
        let (first, last) = match delta.unit {
            DeltaUnit::Day => {
                let day = today.checked_add_signed(TimeDelta::days(delta.amount as i64))?;
                (day, day)
            }
            DeltaUnit::Month => {
                let months = today.year() as i64 * 12 + today.month0() as i64 + delta.amount as i64;
                let year = i32::try_from(months.div_euclid(12)).ok()?;
                let month = months.rem_euclid(12) as u32 + 1;
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                let last = first
                    .checked_add_months(chrono::Months::new(1))?
                    .pred_opt()?;
                (first, last)
            }
            DeltaUnit::Year => {
                let year = today.year().checked_add(delta.amount)?;
                (
                    NaiveDate::from_ymd_opt(year, 1, 1)?,
                    NaiveDate::from_ymd_opt(year, 12, 31)?,
                )
            }
        };
        Some((first.and_time(NaiveTime::MIN), last.and_time(end_of_day())))
    }

    /// Resolved `(start, end)` bound values for a delta.
    pub fn resolve(&self, delta: &Delta) -> Option<(Value, Value)> {
        let (start, end) = self.local_range(delta)?;
        Some((self.bound(start), self.bound(end)))
    }

    /// Turn a display-local wall-clock time into a filter bound.
    ///
    /// Aware storage gets a UTC instant; naive storage keeps the wall clock.
    pub fn bound(&self, local: NaiveDateTime) -> Value {
        match self.storage {
            StorageMode::Aware => Value::Timestamp(localize(&self.timezone, local).with_timezone(&Utc)),
            StorageMode::Naive => Value::DateTime(local),
        }
    }

    /// Parse a literal bound. Date-only and naive values are display-local.
    pub fn literal(&self, s: &str) -> EngineResult<Value> {
        match parse_temporal(s) {
            Some(Value::Timestamp(ts)) => Ok(match self.storage {
                StorageMode::Aware => Value::Timestamp(ts),
                StorageMode::Naive => Value::DateTime(ts.with_timezone(&self.timezone).naive_local()),
            }),
            Some(Value::DateTime(local)) => Ok(self.bound(local)),
            _ => Err(EngineError::InvalidRequest(format!(
                "cannot parse date bound '{}'",
                s
            ))),
        }
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
}

/// Attach a timezone to a wall-clock time.
///
/// Ambiguous times take the earlier instant; times inside a DST gap move
/// forward by the gap.
pub fn localize(timezone: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => timezone
            .from_local_datetime(&(local + TimeDelta::hours(1)))
            .earliest()
            .unwrap_or_else(|| timezone.from_utc_datetime(&local)),
    }
}

// =============================================================================
// Period filter
// =============================================================================

/// Period filter as it appears in a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodFilter {
    pub field: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_delta: Option<String>,
    #[serde(default)]
    pub end_delta: Option<String>,
}

/// Concrete inclusive bounds for a period filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPeriod {
    pub field: String,
    pub start: Option<Value>,
    pub end: Option<Value>,
}

impl ResolvedPeriod {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl PeriodFilter {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn start_delta(mut self, delta: &str) -> Self {
        self.start_delta = Some(delta.to_string());
        self
    }

    pub fn end_delta(mut self, delta: &str) -> Self {
        self.end_delta = Some(delta.to_string());
        self
    }

    pub fn start_date(mut self, date: &str) -> Self {
        self.start_date = Some(date.to_string());
        self
    }

    pub fn end_date(mut self, date: &str) -> Self {
        self.end_date = Some(date.to_string());
        self
    }

    /// Resolve into concrete bounds.
    ///
    /// Literal dates are applied first; a parseable delta for the same bound
    /// then overwrites them. Unparseable deltas leave the bound as it was.
    pub fn resolve(&self, resolver: &DateResolver) -> EngineResult<ResolvedPeriod> {
        let mut start = self
            .start_date
            .as_deref()
            .map(|s| resolver.literal(s))
            .transpose()?;
        let mut end = self
            .end_date
            .as_deref()
            .map(|s| resolver.literal(s))
            .transpose()?;

        if let Some(raw) = &self.start_delta {
            match Delta::parse(raw).and_then(|d| resolver.resolve(&d)) {
                Some((bound, _)) => start = Some(bound),
                None => tracing::debug!(delta = %raw, "ignoring malformed start delta"),
            }
        }
        if let Some(raw) = &self.end_delta {
            match Delta::parse(raw).and_then(|d| resolver.resolve(&d)) {
                Some((_, bound)) => end = Some(bound),
                None => tracing::debug!(delta = %raw, "ignoring malformed end delta"),
            }
        }

        Ok(ResolvedPeriod {
            field: self.field.clone(),
            start,
            end,
        })
    }
}
