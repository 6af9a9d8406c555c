//! Integration tests for calendar bucketing.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tally::model::calendar::{Bucketer, Granularity};
use tally::model::types::StorageMode;
use tally::value::Value;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn aware(tz: Tz) -> Bucketer {
    Bucketer::for_storage(tz, StorageMode::Aware, ts("2024-03-01T00:00:00Z"))
}

#[test]
fn test_day_bucket_follows_display_timezone() {
    let stored = ts("2024-03-01T23:30:00Z");

    let west = aware(chrono_tz::America::Bogota);
    assert_eq!(west.bucket(stored, Granularity::Day), "2024-03-01");

    let east = aware(chrono_tz::Europe::Paris);
    assert_eq!(east.bucket(stored, Granularity::Day), "2024-03-02");
}

#[test]
fn test_bucketing_is_deterministic() {
    let bucketer = aware(chrono_tz::Asia::Kolkata);
    let stored = ts("2024-07-19T20:45:00Z");
    for granularity in [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Weekday,
        Granularity::WeekdayHour,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ] {
        assert_eq!(
            bucketer.bucket(stored, granularity),
            bucketer.bucket(stored, granularity)
        );
    }
}

#[test]
fn test_key_formats() {
    let bucketer = aware(Tz::UTC);
    let stored = ts("2024-08-09T07:05:00Z");
    assert_eq!(bucketer.bucket(stored, Granularity::Hour), "2024-08-09 07");
    assert_eq!(bucketer.bucket(stored, Granularity::Day), "2024-08-09");
    assert_eq!(bucketer.bucket(stored, Granularity::Weekday), "Friday");
    assert_eq!(bucketer.bucket(stored, Granularity::WeekdayHour), "Friday 07");
    assert_eq!(bucketer.bucket(stored, Granularity::Month), "2024-08");
    assert_eq!(bucketer.bucket(stored, Granularity::Quarter), "2024 Q3");
    assert_eq!(bucketer.bucket(stored, Granularity::Year), "2024");
}

#[test]
fn test_quarter_for_every_month() {
    let expected = [1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];
    for (month0, quarter) in expected.iter().enumerate() {
        let local = NaiveDate::from_ymd_opt(2023, month0 as u32 + 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(
            Granularity::Quarter.format(local),
            format!("2023 Q{}", quarter),
            "month {}",
            month0 + 1
        );
    }
}

#[test]
fn test_quarter_uses_shifted_timestamp() {
    // 2024-01-01 02:00 UTC is still Q4 2023 in New York.
    let bucketer = aware(chrono_tz::America::New_York);
    assert_eq!(
        bucketer.bucket(ts("2024-01-01T02:00:00Z"), Granularity::Quarter),
        "2023 Q4"
    );
}

#[test]
fn test_naive_storage_shifts_by_offset() {
    let bucketer = Bucketer::for_storage(
        chrono_tz::America::Sao_Paulo,
        StorageMode::Naive,
        ts("2024-03-01T00:00:00Z"),
    );
    assert_eq!(bucketer.offset_seconds(), -3 * 3600);

    let stored = Value::DateTime(
        NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap(),
    );
    assert_eq!(
        bucketer.bucket_value(&stored, Granularity::Day),
        Value::from("2024-03-01")
    );
}

#[test]
fn test_non_temporal_value_buckets_to_null() {
    let bucketer = aware(Tz::UTC);
    assert_eq!(bucketer.bucket_value(&Value::Null, Granularity::Day), Value::Null);
    assert_eq!(bucketer.bucket_value(&Value::Int(3), Granularity::Day), Value::Null);
}

#[test]
fn test_granularity_names() {
    assert_eq!("weekday+hour".parse::<Granularity>().unwrap(), Granularity::WeekdayHour);
    assert_eq!("weekdayhour".parse::<Granularity>().unwrap(), Granularity::WeekdayHour);
    assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
    assert!("fortnight".parse::<Granularity>().is_err());
}

#[test]
fn test_range_keys() {
    assert_eq!(
        Granularity::Month.range_keys("2023-11", "2024-02").unwrap(),
        vec!["2023-11", "2023-12", "2024-01", "2024-02"]
    );
    assert_eq!(
        Granularity::Quarter.range_keys("2023 Q4", "2024 Q2").unwrap(),
        vec!["2023 Q4", "2024 Q1", "2024 Q2"]
    );
    assert_eq!(
        Granularity::Hour.range_keys("2024-03-01 22", "2024-03-02 01").unwrap(),
        vec!["2024-03-01 22", "2024-03-01 23", "2024-03-02 00", "2024-03-02 01"]
    );
    assert!(Granularity::Weekday.range_keys("Monday", "Friday").is_none());
    assert_eq!(Granularity::Day.range_keys("2024-03-02", "2024-03-01").unwrap(), Vec::<String>::new());
}
