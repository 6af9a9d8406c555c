//! Result reshaping.
//!
//! Turns grouped rows into chart series. The first dimension becomes the
//! x-axis; with a second dimension, its distinct values become series
//! columns.
//!
//! ```text
//! grouped rows                              reshaped
//! {region: A, product: p, sum: 5}           {x: A, p: 5, q: 3}
//! {region: A, product: q, sum: 3}    ──►    {x: B, p: 2}
//! {region: B, product: p, sum: 2}           keys = [p, q]
//! ```

use std::collections::{HashMap, HashSet};

use crate::model::aggregate::{AggregateFn, OutputType};
use crate::model::calendar::Granularity;
use crate::model::dates::ResolvedPeriod;
use crate::model::types::StorageMode;
use crate::planner::logical::{BucketInfo, PlannedQuery};
use indexmap::IndexMap;

use crate::value::{Row, Value, ValueKey};

/// Output field holding the x-axis value.
pub const X_FIELD: &str = "x";

/// What the reshaper needs to know about a grouped result.
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapeSpec {
    pub dimensions: Vec<String>,
    /// Result alias and function of each requested aggregate.
    pub aggregates: Vec<(String, AggregateFn)>,
    pub additional_fields: Vec<String>,
}

/// Output shape, decided by the number of dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PivotShape<'a> {
    /// One column per aggregate; keys are the aggregate aliases.
    Measures,
    /// One column per distinct `series` value holding `formula`'s result.
    ///
    /// Only the first formula is read. Any others are dropped.
    Series { series: &'a str, formula: &'a str },
}

/// Reshaped rows and their series keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reshaped {
    pub data: Vec<Row>,
    pub keys: Vec<String>,
}

impl ReshapeSpec {
    pub fn from_plan(planned: &PlannedQuery) -> Self {
        Self {
            dimensions: planned.dimensions.clone(),
            aggregates: planned
                .aggregates
                .iter()
                .map(|item| (item.alias.clone(), item.func))
                .collect(),
            additional_fields: planned.additional_fields.clone(),
        }
    }

    pub fn shape(&self) -> PivotShape<'_> {
        match (self.dimensions.get(1), self.aggregates.first()) {
            (Some(series), Some((formula, _))) => PivotShape::Series {
                series: series.as_str(),
                formula: formula.as_str(),
            },
            _ => PivotShape::Measures,
        }
    }

    fn aliases(&self) -> Vec<String> {
        self.aggregates.iter().map(|(alias, _)| alias.clone()).collect()
    }
}

/// Pivot grouped rows into chart rows.
///
/// Rows sharing an x label merge into one output row, in first-seen order.
/// A null x and the string `"Null"` share a label, as do `""` and `"Empty"`.
pub fn reshape(rows: &[Row], spec: &ReshapeSpec) -> Reshaped {
    let Some(x_column) = spec.dimensions.first() else {
        return Reshaped::default();
    };
    if rows.is_empty() {
        return Reshaped::default();
    }

    let shape = spec.shape();
    if let PivotShape::Series { formula, .. } = shape {
        if spec.aggregates.len() > 1 {
            let dropped: Vec<&str> = spec.aggregates[1..].iter().map(|(a, _)| a.as_str()).collect();
            tracing::warn!(formula, ?dropped, "series pivot reads only the first formula");
        }
    }

    let mut merged: IndexMap<ValueKey, Row> = IndexMap::new();
    let mut keys: Vec<String> = match shape {
        PivotShape::Measures => spec.aliases(),
        PivotShape::Series { .. } => Vec::new(),
    };
    let mut seen_keys: HashSet<String> = HashSet::new();

    for row in rows {
        let x = display_x(field(row, x_column));
        let out = merged.entry(x.key()).or_insert_with(|| {
            let mut out = Row::new();
            out.insert(X_FIELD.to_string(), x);
            out
        });

        for name in &spec.additional_fields {
            out.insert(name.clone(), field(row, name).clone());
        }

        match shape {
            PivotShape::Measures => {
                for (alias, _) in &spec.aggregates {
                    out.insert(alias.clone(), field(row, alias).clone());
                }
            }
            PivotShape::Series { series, formula } => {
                let key = field(row, series).to_key_string();
                if !out.contains_key(key.as_str()) {
                    out.insert(key.clone(), field(row, formula).clone());
                }
                if seen_keys.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
    }

    Reshaped {
        data: merged.into_iter().map(|(_, row)| row).collect(),
        keys,
    }
}

fn field<'r>(row: &'r Row, name: &str) -> &'r Value {
    row.get(name).unwrap_or(&Value::Null)
}

fn display_x(x: &Value) -> Value {
    match x {
        Value::Null => Value::from("Null"),
        Value::String(s) if s.is_empty() => Value::from("Empty"),
        other => other.clone(),
    }
}

/// Rewrite series keys and row field names through a label map.
///
/// Unmapped names pass through. Renamed fields keep their position. A label
/// that would land on a name already present is skipped, keeping both
/// columns.
pub fn translate_keys(reshaped: &mut Reshaped, labels: &HashMap<String, String>) {
    let keys = std::mem::take(&mut reshaped.keys).into_iter().map(|key| (key, ()));
    reshaped.keys = relabel(keys, labels).into_keys().collect();
    for row in &mut reshaped.data {
        *row = relabel(std::mem::take(row), labels);
    }
}

fn relabel<V>(
    entries: impl IntoIterator<Item = (String, V)>,
    labels: &HashMap<String, String>,
) -> IndexMap<String, V> {
    let entries: Vec<(String, V)> = entries.into_iter().collect();
    let present: HashSet<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    let targets: Vec<String> = entries
        .iter()
        .map(|(name, _)| match labels.get(name.as_str()) {
            Some(label) if label != name && present.contains(label.as_str()) => {
                tracing::warn!(name = %name, label = %label, "label collides with an existing key; keeping name");
                name.clone()
            }
            Some(label) => label.clone(),
            None => name.clone(),
        })
        .collect();

    let mut out = IndexMap::with_capacity(entries.len());
    for (target, (name, value)) in targets.into_iter().zip(entries) {
        if out.contains_key(target.as_str()) {
            tracing::warn!(name = %name, label = %target, "label already used by another key; keeping name");
            out.insert(name, value);
        } else {
            out.insert(target, value);
        }
    }
    out
}

// =============================================================================
// Gap filling
// =============================================================================

/// Bucket range to densify.
#[derive(Debug, Clone, PartialEq)]
pub struct GapFill {
    pub granularity: Granularity,
    /// First bucket key; the earliest observed bucket when absent.
    pub first: Option<String>,
    /// Last bucket key; the latest observed bucket when absent.
    pub last: Option<String>,
}

impl GapFill {
    /// Gap filling for a date bucket, bounded by the period filter when it
    /// targets the bucketed column. `None` for weekday granularities.
    pub fn for_bucket(bucket: &BucketInfo, period: Option<&ResolvedPeriod>) -> Option<Self> {
        if !bucket.granularity.is_chronological() {
            return None;
        }
        let period = period.filter(|p| p.field == bucket.column);
        let key = |bound: Option<&Value>| bound.and_then(|value| bound_key(bucket, value));
        Some(Self {
            granularity: bucket.granularity,
            first: key(period.and_then(|p| p.start.as_ref())),
            last: key(period.and_then(|p| p.end.as_ref())),
        })
    }
}

/// Bucket key of a period bound.
///
/// Naive bounds are already display-local wall-clock times.
fn bound_key(bucket: &BucketInfo, bound: &Value) -> Option<String> {
    match (bucket.bucketer.storage(), bound) {
        (StorageMode::Naive, Value::DateTime(local)) => Some(bucket.granularity.format(*local)),
        _ => bucket
            .bucketer
            .bucket_value(bound, bucket.granularity)
            .as_str()
            .map(str::to_string),
    }
}

/// Emit one row per bucket in range, in chronological order.
///
/// Missing buckets get zero for `count`/`sum` and null for other aggregates.
/// Missing series cells are zero. Rows whose x value falls outside the range
/// are kept after the filled range.
pub fn fill_gaps(reshaped: &mut Reshaped, spec: &ReshapeSpec, gaps: &GapFill) {
    if reshaped.data.is_empty() {
        return;
    }
    let granularity = gaps.granularity;

    let observed: Vec<(chrono::NaiveDateTime, String)> = reshaped
        .data
        .iter()
        .filter_map(|row| row.get(X_FIELD).and_then(Value::as_str))
        .filter_map(|key| granularity.parse_key(key).map(|start| (start, key.to_string())))
        .collect();
    let first = gaps
        .first
        .clone()
        .or_else(|| observed.iter().min().map(|(_, key)| key.clone()));
    let last = gaps
        .last
        .clone()
        .or_else(|| observed.iter().max().map(|(_, key)| key.clone()));
    let (Some(first), Some(last)) = (first, last) else {
        return;
    };
    let Some(range) = granularity.range_keys(&first, &last) else {
        return;
    };
    let in_range: HashSet<&str> = range.iter().map(String::as_str).collect();

    let mut slots: HashMap<String, Row> = HashMap::new();
    let mut rest = Vec::new();
    for row in reshaped.data.drain(..) {
        let key = row.get(X_FIELD).and_then(Value::as_str).map(str::to_string);
        match key {
            Some(key) if in_range.contains(key.as_str()) && !slots.contains_key(&key) => {
                slots.insert(key, row);
            }
            _ => rest.push(row),
        }
    }

    let shape = spec.shape();
    let mut data: Vec<Row> = range
        .iter()
        .map(|key| slots.remove(key).unwrap_or_else(|| empty_bucket(key, spec, shape)))
        .collect();
    data.extend(rest);

    if let PivotShape::Series { .. } = shape {
        for row in &mut data {
            for key in &reshaped.keys {
                if !row.contains_key(key.as_str()) {
                    row.insert(key.clone(), Value::Int(0));
                }
            }
        }
    }

    tracing::debug!(
        granularity = %granularity,
        buckets = range.len(),
        "filled bucket gaps"
    );
    reshaped.data = data;
}

fn empty_bucket(key: &str, spec: &ReshapeSpec, shape: PivotShape<'_>) -> Row {
    let mut row = Row::new();
    row.insert(X_FIELD.to_string(), Value::from(key));
    for name in &spec.additional_fields {
        row.insert(name.clone(), Value::Null);
    }
    if let PivotShape::Measures = shape {
        for (alias, func) in &spec.aggregates {
            row.insert(alias.clone(), empty_value(*func));
        }
    }
    row
}

fn empty_value(func: AggregateFn) -> Value {
    match (func.zero_when_empty(), func.output_type()) {
        (true, OutputType::Float) => Value::Float(0.0),
        (true, OutputType::Native) => Value::Int(0),
        (false, _) => Value::Null,
    }
}
