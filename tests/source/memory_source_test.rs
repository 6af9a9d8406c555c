//! Tests for executing logical plans against the in-memory source.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::TryStreamExt;
use serde_json::json;
use tally::model::types::StorageMode;
use tally::planner::logical::{
    LogicalPlan, PlanBuilder, PlanContext, ProjectNode, ScanNode,
};
use tally::query::AggregateRequest;
use tally::source::{DataSource, MemorySource, SourceError};
use tally::value::{row_from_pairs, Row, Value};

fn orders() -> MemorySource {
    let rows: Vec<Row> = serde_json::from_value(json!([
        {"id": 1, "region": "north", "status": "paid", "price": 10.0, "quantity": 2, "created_at": "2024-01-05T10:00:00Z"},
        {"id": 2, "region": "south", "status": "paid", "price": 5.0, "quantity": 1, "created_at": "2024-01-20T23:30:00Z"},
        {"id": 3, "region": "north", "status": "void", "price": 7.5, "quantity": 4, "created_at": "2024-02-02T08:15:00Z"},
        {"id": 4, "region": "north", "status": "paid", "price": 2.0, "quantity": 3, "created_at": "2024-03-11T14:00:00Z"},
        {"id": 5, "region": null, "status": "paid", "price": 1.0, "quantity": 1, "created_at": "2024-03-30T01:00:00Z"}
    ]))
    .unwrap();
    MemorySource::new("sales_Order", rows)
}

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

async fn run(source: &MemorySource, request: serde_json::Value) -> Vec<Row> {
    let request: AggregateRequest = serde_json::from_value(request).unwrap();
    let ctx = PlanContext::new(Tz::UTC, now(), StorageMode::Aware);
    let planned = PlanBuilder::new(&ctx).build(&request).unwrap();
    source.execute(&planned.plan).await.unwrap().try_collect().await.unwrap()
}

#[tokio::test]
async fn test_groups_in_first_seen_order() {
    let rows = run(
        &orders(),
        json!({
            "model": "sales_Order",
            "calc": {"formula": ["count", "sum"], "field": "quantity"},
            "group_by": {"fields": ["region"]}
        }),
    )
    .await;

    assert_eq!(
        rows,
        vec![
            row_from_pairs([("region", Value::from("north")), ("count", Value::Int(3)), ("sum", Value::Float(9.0))]),
            row_from_pairs([("region", Value::from("south")), ("count", Value::Int(1)), ("sum", Value::Float(1.0))]),
            row_from_pairs([("region", Value::Null), ("count", Value::Int(1)), ("sum", Value::Float(1.0))]),
        ]
    );
}

#[tokio::test]
async fn test_filter_bucket_and_arithmetic() {
    let rows = run(
        &orders(),
        json!({
            "model": "sales_Order",
            "calc": {"formula": ["sum"], "field": ["price", "*", "quantity"]},
            "group_by": {"date": {"field": "created_at", "granularity": "month"}},
            "filter_by": {"fields": {"status": "paid"}}
        }),
    )
    .await;

    assert_eq!(
        rows,
        vec![
            row_from_pairs([("extracted_created_at", Value::from("2024-01")), ("sum", Value::Float(25.0))]),
            row_from_pairs([("extracted_created_at", Value::from("2024-03")), ("sum", Value::Float(7.0))]),
        ]
    );
}

#[tokio::test]
async fn test_period_bounds_are_inclusive() {
    let rows = run(
        &orders(),
        json!({
            "model": "sales_Order",
            "group_by": {"fields": ["status"]},
            "filter_by": {"period": {"field": "created_at", "start_delta": "-2m", "end_delta": "-2m"}}
        }),
    )
    .await;

    // Only January 2024
    assert_eq!(
        rows,
        vec![row_from_pairs([("status", Value::from("paid")), ("count", Value::Int(2))])]
    );
}

#[tokio::test]
async fn test_sort_descending_then_limit() {
    let rows = run(
        &orders(),
        json!({
            "model": "sales_Order",
            "calc": {"formula": ["max"], "field": "price"},
            "group_by": {"fields": ["id"]},
            "order": ["-max"],
            "limit": 2
        }),
    )
    .await;

    let ids: Vec<&Value> = rows.iter().map(|r| r.get("id").unwrap()).collect();
    assert_eq!(ids, vec![&Value::Int(1), &Value::Int(3)]);
}

#[tokio::test]
async fn test_passthrough_takes_first_row() {
    let rows = run(
        &orders(),
        json!({
            "model": "sales_Order",
            "group_by": {"fields": ["region"]},
            "additional_fields": ["status"]
        }),
    )
    .await;

    assert_eq!(rows[0].get("status"), Some(&Value::from("paid")));
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["region", "count", "status"]);
}

#[tokio::test]
async fn test_missing_passthrough_column_is_null() {
    let rows: Vec<Row> = serde_json::from_value(json!([
        {"id": 1, "region": "north"},
        {"id": 2, "region": "south", "note": "rush"}
    ]))
    .unwrap();
    let rows = run(
        &MemorySource::new("sales_Order", rows),
        json!({
            "model": "sales_Order",
            "group_by": {"fields": ["region"]},
            "additional_fields": ["note"]
        }),
    )
    .await;

    assert_eq!(
        rows,
        vec![
            row_from_pairs([("region", Value::from("north")), ("count", Value::Int(1)), ("note", Value::Null)]),
            row_from_pairs([("region", Value::from("south")), ("count", Value::Int(1)), ("note", Value::from("rush"))]),
        ]
    );
}

#[tokio::test]
async fn test_total_over_empty_input() {
    let source = MemorySource::new("sales_Order", vec![]);
    let request: AggregateRequest = serde_json::from_value(json!({
        "model": "sales_Order",
        "calc": {"formula": ["sum"], "field": "price"}
    }))
    .unwrap();
    let ctx = PlanContext::new(Tz::UTC, now(), StorageMode::Aware);
    let planned = PlanBuilder::new(&ctx).build(&request).unwrap();

    let row = source.aggregate(&planned.plan).await.unwrap();
    assert_eq!(row.get("aggregated_total"), Some(&Value::Null));
}

#[tokio::test]
async fn test_projecting_unknown_column_fails() {
    let plan = LogicalPlan::Project(ProjectNode {
        input: Box::new(LogicalPlan::Scan(ScanNode {
            model: "sales_Order".to_string(),
            extra: None,
        })),
        columns: vec!["discount".to_string()],
    });

    let result = orders().execute(&plan).await.map(|_| ());
    assert!(matches!(result, Err(SourceError::UnknownColumn(column)) if column == "discount"));
}

#[tokio::test]
async fn test_sum_of_text_column_fails() {
    let request: AggregateRequest = serde_json::from_value(json!({
        "model": "sales_Order",
        "calc": {"formula": ["sum"], "field": "status"}
    }))
    .unwrap();
    let ctx = PlanContext::new(Tz::UTC, now(), StorageMode::Aware);
    let planned = PlanBuilder::new(&ctx).build(&request).unwrap();

    let result = orders().aggregate(&planned.plan).await;
    assert!(matches!(result, Err(SourceError::TypeMismatch { .. })));
}
