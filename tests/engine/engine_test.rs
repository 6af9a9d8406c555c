//! End-to-end tests for the aggregation engine.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use insta::assert_snapshot;
use serde_json::json;
use tally::engine::{Engine, EngineOptions};
use tally::error::EngineError;
use tally::model::types::StorageMode;
use tally::query::{AggregateRequest, AggregateResponse};
use tally::source::{MemorySource, SourceCatalog};
use tally::value::{row_from_pairs, Row, Value};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn orders() -> Vec<Row> {
    serde_json::from_value(json!([
        {"id": 1, "region": "north", "product": "p", "status": "paid", "price": 10.0, "quantity": 2, "created_at": "2024-01-05T10:00:00Z"},
        {"id": 2, "region": "south", "product": "p", "status": "paid", "price": 5.0, "quantity": 1, "created_at": "2024-01-31T23:30:00Z"},
        {"id": 3, "region": "north", "product": "q", "status": "void", "price": 7.5, "quantity": 4, "created_at": "2024-02-02T08:15:00Z"},
        {"id": 4, "region": "north", "product": "q", "status": "paid", "price": 2.0, "quantity": 3, "created_at": "2024-03-11T14:00:00Z"},
        {"id": 5, "region": "", "product": "p", "status": "paid", "price": 1.0, "quantity": 1, "created_at": "2024-03-14T01:00:00Z"}
    ]))
    .unwrap()
}

fn engine() -> Engine {
    Engine::new(SourceCatalog::new().with_source(MemorySource::new("sales_Order", orders())))
}

async fn execute(engine: &Engine, request: serde_json::Value, tz: Tz) -> AggregateResponse {
    let request: AggregateRequest = serde_json::from_value(request).unwrap();
    engine.execute_at(&request, tz, now()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_no_group_returns_total() {
    let response = execute(
        &engine(),
        json!({"model": "sales_Order", "calc": {"formula": ["sum"], "field": ["price", "*", "quantity"]}}),
        Tz::UTC,
    )
    .await;

    assert!(matches!(response, AggregateResponse::Total { .. }));
    assert_snapshot!(serde_json::to_string(&response).unwrap(), @r#"{"total":62.0}"#);
}

#[tokio::test]
async fn test_distinct_total() {
    let response = execute(
        &engine(),
        json!({"model": "sales_Order", "calc": {"formula": ["count"], "field": "region"}, "distinct": true}),
        Tz::UTC,
    )
    .await;
    assert_eq!(response.total(), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_unknown_model_is_absent() {
    let request = AggregateRequest::new("sales_Refund");
    let response = engine().execute_at(&request, Tz::UTC, now()).await.unwrap();
    assert!(response.is_none());
}

#[tokio::test]
async fn test_monthly_buckets_follow_timezone() {
    let request = json!({
        "model": "sales_Order",
        "group_by": {"date": {"field": "created_at", "granularity": "month"}},
        "order": ["count"]
    });

    // Order 2 lands in February once shifted east of UTC.
    let utc = execute(&engine(), request.clone(), Tz::UTC).await;
    assert_snapshot!(serde_json::to_string(&utc).unwrap(), @r#"{"data":[{"x":"2024-01","count":2},{"x":"2024-02","count":1},{"x":"2024-03","count":2}],"keys":["count"]}"#);

    let paris = execute(&engine(), request, chrono_tz::Europe::Paris).await;
    assert_snapshot!(serde_json::to_string(&paris).unwrap(), @r#"{"data":[{"x":"2024-01","count":1},{"x":"2024-02","count":2},{"x":"2024-03","count":2}],"keys":["count"]}"#);
}

#[tokio::test]
async fn test_two_dimension_pivot_with_labels() {
    let response = execute(
        &engine(),
        json!({
            "model": "sales_Order",
            "calc": {"formula": ["sum"], "field": "quantity"},
            "group_by": {"fields": ["region", "product"]},
            "keys": {"p": "Product P", "q": "Product Q"}
        }),
        Tz::UTC,
    )
    .await;

    assert_eq!(response.keys(), ["Product P", "Product Q"]);
    assert_snapshot!(serde_json::to_string(&response).unwrap(), @r#"{"data":[{"x":"north","Product P":2.0,"Product Q":7.0},{"x":"south","Product P":1.0},{"x":"Empty","Product P":1.0}],"keys":["Product P","Product Q"]}"#);
}

#[tokio::test]
async fn test_raw_keeps_grouped_rows() {
    let response = execute(
        &engine(),
        json!({
            "model": "sales_Order",
            "group_by": {"fields": ["status"]},
            "raw": true
        }),
        Tz::UTC,
    )
    .await;

    assert_eq!(response.keys(), ["status"]);
    assert_eq!(
        response.data(),
        [
            row_from_pairs([("status", Value::from("paid")), ("count", Value::Int(4))]),
            row_from_pairs([("status", Value::from("void")), ("count", Value::Int(1))]),
        ]
    );
}

#[tokio::test]
async fn test_date_like_text_dimension_is_kept_verbatim() {
    let rows: Vec<Row> = serde_json::from_value(json!([
        {"id": 1, "label": "2024-03-01", "kind": "a"},
        {"id": 2, "label": "2024-03-01", "kind": "2024-03-02"},
        {"id": 3, "label": "other", "kind": "a"}
    ]))
    .unwrap();
    let engine = Engine::new(SourceCatalog::new().with_source(MemorySource::new("sales_Order", rows)));

    let single = execute(
        &engine,
        json!({"model": "sales_Order", "group_by": {"fields": ["label"]}}),
        Tz::UTC,
    )
    .await;
    assert_snapshot!(serde_json::to_string(&single).unwrap(), @r#"{"data":[{"x":"2024-03-01","count":2},{"x":"other","count":1}],"keys":["count"]}"#);

    let series = execute(
        &engine,
        json!({"model": "sales_Order", "group_by": {"fields": ["label", "kind"]}}),
        Tz::UTC,
    )
    .await;
    assert_eq!(series.keys(), ["a", "2024-03-02"]);
}

#[tokio::test]
async fn test_empty_result() {
    let response = execute(
        &engine(),
        json!({
            "model": "sales_Order",
            "group_by": {"fields": ["region"]},
            "filter_by": {"fields": {"status": "refunded"}},
            "fill_gaps": true
        }),
        Tz::UTC,
    )
    .await;

    assert_snapshot!(serde_json::to_string(&response).unwrap(), @r#"{"data":[],"keys":[]}"#);
}

#[tokio::test]
async fn test_gap_fill_uses_period_bounds() {
    let response = execute(
        &engine(),
        json!({
            "model": "sales_Order",
            "group_by": {"date": {"field": "created_at", "granularity": "day"}},
            "filter_by": {
                "fields": {"status": "paid"},
                "period": {"field": "created_at", "start_date": "2024-03-10", "end_date": "2024-03-14"}
            },
            "fill_gaps": true
        }),
        Tz::UTC,
    )
    .await;

    // End bound is the start of 2024-03-14, so order 5 at 01:00 is excluded.
    assert_snapshot!(serde_json::to_string(&response).unwrap(), @r#"{"data":[{"x":"2024-03-10","count":0},{"x":"2024-03-11","count":1},{"x":"2024-03-12","count":0},{"x":"2024-03-13","count":0},{"x":"2024-03-14","count":0}],"keys":["count"]}"#);
}

#[tokio::test]
async fn test_engine_default_fill_gaps() {
    let engine = engine().with_options(EngineOptions {
        fill_gaps: true,
        max_limit: None,
    });
    let response = execute(
        &engine,
        json!({
            "model": "sales_Order",
            "calc": {"formula": ["avg"], "field": "price"},
            "group_by": {"date": {"field": "created_at", "granularity": "quarter"}},
            "filter_by": {"period": {"field": "created_at", "start_delta": "-y", "end_delta": "0m"}}
        }),
        Tz::UTC,
    )
    .await;

    let xs: Vec<String> = response
        .data()
        .iter()
        .map(|row| row.get("x").unwrap().to_string())
        .collect();
    assert_eq!(
        xs,
        vec!["2023 Q1", "2023 Q2", "2023 Q3", "2023 Q4", "2024 Q1"]
    );
    assert_eq!(response.data()[0].get("avg"), Some(&Value::Null));
}

#[tokio::test]
async fn test_naive_storage_filters_on_wall_clock() {
    let rows: Vec<Row> = serde_json::from_value(json!([
        {"id": 1, "created_at": "2024-02-29 23:00:00"},
        {"id": 2, "created_at": "2024-03-01 00:30:00"}
    ]))
    .unwrap();
    let source = MemorySource::new("crm_Lead", rows).with_storage(StorageMode::Naive);
    let engine = Engine::new(SourceCatalog::new().with_source(source));

    let response = execute(
        &engine,
        json!({
            "model": "crm_Lead",
            "filter_by": {"period": {"field": "created_at", "start_delta": "-1m", "end_delta": "-1m"}}
        }),
        chrono_tz::America::Sao_Paulo,
    )
    .await;
    assert_eq!(response.total(), Some(&Value::Int(1)));
}

#[tokio::test]
async fn test_errors_propagate() {
    let request: AggregateRequest = serde_json::from_value(json!({
        "model": "sales_Order",
        "calc": {"formula": ["sum"], "field": "status"}
    }))
    .unwrap();
    let result = engine().execute_at(&request, Tz::UTC, now()).await;
    assert!(matches!(result, Err(EngineError::DataSource(_))));

    let request: AggregateRequest = serde_json::from_value(json!({
        "model": "sales_Order",
        "calc": {"formula": ["median"]}
    }))
    .unwrap();
    let result = engine().execute_at(&request, Tz::UTC, now()).await;
    assert!(matches!(result, Err(EngineError::UnknownAggregate(name)) if name == "median"));
}
