//! In-memory data source.
//!
//! Holds rows in a vector and executes logical plans directly. Used by the
//! CLI for JSON datasets and by tests as the reference implementation of the
//! plan semantics.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::{DataSource, RowStream, SourceError, SourceResult};
use crate::model::aggregate::{AggregateFn, OutputType};
use crate::model::types::StorageMode;
use crate::planner::logical::{
    AggregateItem, AggregateNode, BucketNode, LogicalPlan, Predicate, ProjectNode, SortNode,
};
use indexmap::IndexMap;

use crate::value::{Row, Value, ValueKey};

/// Rows held in memory under a model name.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    rows: Vec<Row>,
    storage: StorageMode,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
            storage: StorageMode::Aware,
        }
    }

    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    /// Parse rows from a JSON array of objects, or one object per line.
    pub fn from_json_str(name: impl Into<String>, text: &str) -> SourceResult<Self> {
        let trimmed = text.trim_start();
        let rows: Vec<Row> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<_, _>>()?
        };
        Ok(Self::new(name, rows))
    }

    pub async fn from_json_file(name: impl Into<String>, path: impl AsRef<Path>) -> SourceResult<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(name, &text)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Run a plan to completion.
    pub fn run(&self, plan: &LogicalPlan) -> SourceResult<Vec<Row>> {
        match plan {
            LogicalPlan::Scan(node) => {
                if node.extra.is_some() {
                    tracing::warn!(model = %self.name, "memory source ignores extra clause");
                }
                Ok(self.rows.clone())
            }
            LogicalPlan::Filter(node) => {
                let mut rows = self.run(&node.input)?;
                rows.retain(|row| node.predicates.iter().all(|p| matches_predicate(row, p)));
                Ok(rows)
            }
            LogicalPlan::Bucket(node) => {
                let rows = self.run(&node.input)?;
                Ok(rows.into_iter().map(|row| bucket_row(row, node)).collect())
            }
            LogicalPlan::Aggregate(node) => {
                let rows = self.run(&node.input)?;
                aggregate_rows(&rows, node)
            }
            LogicalPlan::Sort(node) => {
                let mut rows = self.run(&node.input)?;
                sort_rows(&mut rows, node);
                Ok(rows)
            }
            LogicalPlan::Limit(node) => {
                let mut rows = self.run(&node.input)?;
                rows.truncate(usize::try_from(node.limit).unwrap_or(usize::MAX));
                Ok(rows)
            }
            LogicalPlan::Project(node) => {
                let rows = self.run(&node.input)?;
                rows.iter().map(|row| project_row(row, node)).collect()
            }
        }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage(&self) -> StorageMode {
        self.storage
    }

    async fn execute<'a>(&'a self, plan: &'a LogicalPlan) -> SourceResult<RowStream<'a>> {
        let rows = self.run(plan)?;
        tracing::debug!(model = %self.name, rows = rows.len(), "executed plan in memory");
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

fn matches_predicate(row: &Row, predicate: &Predicate) -> bool {
    let actual = row.get(predicate.column()).unwrap_or(&Value::Null);
    match predicate {
        Predicate::Eq { value, .. } => actual == value || actual.compare(value) == Some(std::cmp::Ordering::Equal),
        Predicate::Gte { value, .. } => !actual.is_null() && actual.compare(value).is_some_and(|o| o.is_ge()),
        Predicate::Lte { value, .. } => !actual.is_null() && actual.compare(value).is_some_and(|o| o.is_le()),
    }
}

fn bucket_row(mut row: Row, node: &BucketNode) -> Row {
    let value = row.get(node.column.as_str()).unwrap_or(&Value::Null);
    let key = node.bucketer.bucket_value(value, node.granularity);
    row.insert(node.alias.clone(), key);
    row
}

fn sort_rows(rows: &mut [Row], node: &SortNode) {
    rows.sort_by(|a, b| {
        for order in &node.order_by {
            let left = a.get(order.column.as_str()).unwrap_or(&Value::Null);
            let right = b.get(order.column.as_str()).unwrap_or(&Value::Null);
            let ordering = left.sort_cmp(right);
            let ordering = if order.descending { ordering.reverse() } else { ordering };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn project_row(row: &Row, node: &ProjectNode) -> SourceResult<Row> {
    node.columns
        .iter()
        .map(|column| {
            row.get(column.as_str())
                .cloned()
                .map(|value| (column.clone(), value))
                .ok_or_else(|| SourceError::UnknownColumn(column.clone()))
        })
        .collect()
}

// =============================================================================
// Aggregation
// =============================================================================

struct Group<'r> {
    dimensions: Vec<Value>,
    first: Option<&'r Row>,
    inputs: Vec<Vec<Value>>,
    rows: u64,
}

fn aggregate_rows(rows: &[Row], node: &AggregateNode) -> SourceResult<Vec<Row>> {
    let mut groups: IndexMap<Vec<ValueKey>, Group<'_>> = IndexMap::new();

    // Ungrouped aggregates produce a row even for empty input.
    if node.group_by.is_empty() {
        groups.insert(vec![], new_group(vec![], node));
    }

    for row in rows {
        let dimensions: Vec<Value> = node
            .group_by
            .iter()
            .map(|column| row.get(column.as_str()).cloned().unwrap_or(Value::Null))
            .collect();
        let key: Vec<ValueKey> = dimensions.iter().map(Value::key).collect();

        let group = groups.entry(key).or_insert_with(|| new_group(dimensions, node));
        group.first.get_or_insert(row);
        group.rows += 1;
        for (item, inputs) in node.aggregates.iter().zip(group.inputs.iter_mut()) {
            let value = item.expr.evaluate(row);
            if !value.is_null() {
                inputs.push(value);
            }
        }
    }

    let mut output = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        let mut out = Row::with_capacity(node.group_by.len() + node.aggregates.len());
        for (column, value) in node.group_by.iter().zip(group.dimensions) {
            out.insert(column.clone(), value);
        }
        for (item, inputs) in node.aggregates.iter().zip(group.inputs) {
            out.insert(item.alias.clone(), finish(item, inputs, group.rows)?);
        }
        // Sparse rows may lack a passthrough column; it projects as null.
        for column in &node.passthrough {
            if out.contains_key(column.as_str()) {
                continue;
            }
            let value = group
                .first
                .and_then(|first| first.get(column.as_str()))
                .cloned()
                .unwrap_or(Value::Null);
            out.insert(column.clone(), value);
        }
        output.push(out);
    }
    Ok(output)
}

fn new_group<'r>(dimensions: Vec<Value>, node: &AggregateNode) -> Group<'r> {
    Group {
        dimensions,
        first: None,
        inputs: vec![Vec::new(); node.aggregates.len()],
        rows: 0,
    }
}

fn finish(item: &AggregateItem, inputs: Vec<Value>, rows: u64) -> SourceResult<Value> {
    let inputs = if item.distinct { dedupe(inputs) } else { inputs };

    if item.expr.is_row_count() {
        let count = if item.distinct { inputs.len() as u64 } else { rows };
        return Ok(Value::Int(count as i64));
    }

    let value = match item.func {
        AggregateFn::Count => Value::Int(inputs.len() as i64),
        AggregateFn::Min => extreme(inputs, std::cmp::Ordering::Less),
        AggregateFn::Max => extreme(inputs, std::cmp::Ordering::Greater),
        AggregateFn::Sum => {
            let numbers = numeric(item, &inputs)?;
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float(numbers.iter().sum())
            }
        }
        AggregateFn::Avg => {
            let numbers = numeric(item, &inputs)?;
            mean(&numbers).map(Value::Float).unwrap_or(Value::Null)
        }
        AggregateFn::Variance => {
            let numbers = numeric(item, &inputs)?;
            variance(&numbers).map(Value::Float).unwrap_or(Value::Null)
        }
        AggregateFn::StdDev => {
            let numbers = numeric(item, &inputs)?;
            variance(&numbers).map(|v| Value::Float(v.sqrt())).unwrap_or(Value::Null)
        }
    };

    Ok(match (item.output, value) {
        (OutputType::Float, Value::Int(i)) => Value::Float(i as f64),
        (_, value) => value,
    })
}

fn dedupe(inputs: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    inputs.into_iter().filter(|v| seen.insert(v.key())).collect()
}

fn numeric(item: &AggregateItem, inputs: &[Value]) -> SourceResult<Vec<f64>> {
    inputs
        .iter()
        .map(|value| {
            value.as_f64().ok_or_else(|| SourceError::TypeMismatch {
                column: item.expr.to_string(),
                expected: "number",
                found: value.to_string(),
            })
        })
        .collect()
}

fn extreme(inputs: Vec<Value>, keep: std::cmp::Ordering) -> Value {
    let mut best: Option<Value> = None;
    for value in inputs {
        best = match best {
            Some(current) if value.compare(&current) != Some(keep) => Some(current),
            _ => Some(value),
        };
    }
    best.unwrap_or(Value::Null)
}

fn mean(numbers: &[f64]) -> Option<f64> {
    if numbers.is_empty() {
        return None;
    }
    Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
}

/// Population variance.
fn variance(numbers: &[f64]) -> Option<f64> {
    let mean = mean(numbers)?;
    let squares: f64 = numbers.iter().map(|n| (n - mean).powi(2)).sum();
    Some(squares / numbers.len() as f64)
}
