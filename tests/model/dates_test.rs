//! Integration tests for relative date resolution.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tally::model::dates::{DateResolver, Delta, PeriodFilter};
use tally::model::types::StorageMode;
use tally::value::Value;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, micro: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_micro_opt(h, min, s, micro)
        .unwrap()
}

fn naive(tz: Tz) -> DateResolver {
    DateResolver::new(tz, now(), StorageMode::Naive)
}

#[test]
fn test_previous_month_in_leap_year() {
    let resolver = naive(Tz::UTC);
    let (start, end) = resolver.resolve(&Delta::parse("-1m").unwrap()).unwrap();
    assert_eq!(start, Value::DateTime(local(2024, 2, 1, 0, 0, 0, 0)));
    assert_eq!(end, Value::DateTime(local(2024, 2, 29, 23, 59, 59, 999_999)));
}

#[test]
fn test_days_ahead() {
    let resolver = naive(Tz::UTC);
    let (start, end) = resolver.resolve(&Delta::parse("2d").unwrap()).unwrap();
    assert_eq!(start, Value::DateTime(local(2024, 3, 17, 0, 0, 0, 0)));
    assert_eq!(end, Value::DateTime(local(2024, 3, 17, 23, 59, 59, 999_999)));
}

#[test]
fn test_month_across_year_boundary() {
    let resolver = naive(Tz::UTC);
    let (start, end) = resolver.resolve(&Delta::parse("-3m").unwrap()).unwrap();
    assert_eq!(start, Value::DateTime(local(2023, 12, 1, 0, 0, 0, 0)));
    assert_eq!(end, Value::DateTime(local(2023, 12, 31, 23, 59, 59, 999_999)));
}

#[test]
fn test_year_without_digits() {
    let resolver = naive(Tz::UTC);
    let (start, end) = resolver.resolve(&Delta::parse("-y").unwrap()).unwrap();
    assert_eq!(start, Value::DateTime(local(2023, 1, 1, 0, 0, 0, 0)));
    assert_eq!(end, Value::DateTime(local(2023, 12, 31, 23, 59, 59, 999_999)));
}

#[test]
fn test_aware_bounds_are_utc_instants() {
    let resolver = DateResolver::new(chrono_tz::America::Sao_Paulo, now(), StorageMode::Aware);
    let (start, _) = resolver.resolve(&Delta::parse("0d").unwrap()).unwrap();
    let expected = DateTime::parse_from_rfc3339("2024-03-15T03:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(start, Value::Timestamp(expected));
}

#[test]
fn test_malformed_delta_leaves_bounds_unset() {
    let resolver = naive(Tz::UTC);
    let period = PeriodFilter::new("created_at")
        .start_delta("xx")
        .end_delta("xx")
        .resolve(&resolver)
        .unwrap();
    assert_eq!(period.start, None);
    assert_eq!(period.end, None);
    assert!(period.is_unbounded());
}

#[test]
fn test_literal_and_delta_bounds_combine() {
    let resolver = naive(Tz::UTC);
    let period = PeriodFilter::new("created_at")
        .start_delta("-1y")
        .end_date("2024-12-31")
        .resolve(&resolver)
        .unwrap();
    assert_eq!(period.start, Some(Value::DateTime(local(2023, 1, 1, 0, 0, 0, 0))));
    assert_eq!(period.end, Some(Value::DateTime(local(2024, 12, 31, 0, 0, 0, 0))));
}

#[test]
fn test_unparseable_literal_is_rejected() {
    let resolver = naive(Tz::UTC);
    let result = PeriodFilter::new("created_at").start_date("yesterday").resolve(&resolver);
    assert!(result.is_err());
}
