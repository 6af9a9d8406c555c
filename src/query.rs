//! Request and response contract.
//!
//! ```json
//! {
//!   "model": "sales_Order",
//!   "calc": {"formula": ["sum"], "field": ["price", "*", "quantity"]},
//!   "group_by": {"date": {"field": "created_at", "granularity": "month"}, "fields": ["region"]},
//!   "filter_by": {"fields": {"status": "paid"}, "period": {"field": "created_at", "start_delta": "-1y"}},
//!   "order": ["region"],
//!   "keys": {"north": "North"}
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::dates::PeriodFilter;
use crate::model::expr::FieldSpec;
use crate::value::{Row, Value};

/// A declarative aggregation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// Model (table) name, resolved through a [`crate::source::Catalog`].
    pub model: String,

    /// Columns copied through to every output row.
    #[serde(default)]
    pub additional_fields: Vec<String>,

    /// Ordering columns; a leading `-` sorts descending.
    #[serde(default)]
    pub order: Vec<String>,

    #[serde(default)]
    pub limit: Option<u64>,

    /// Skip reshaping and return grouped rows verbatim.
    #[serde(default)]
    pub raw: bool,

    /// Display labels for series keys and output field names.
    #[serde(default)]
    pub keys: Option<HashMap<String, String>>,

    #[serde(default)]
    pub distinct: bool,

    #[serde(default)]
    pub calc: CalcSpec,

    #[serde(default)]
    pub group_by: GroupBySpec,

    /// Opaque clause forwarded to the data source.
    #[serde(default)]
    pub extra: Option<serde_json::Value>,

    #[serde(default)]
    pub filter_by: FilterSpec,

    /// Emit a row for every date bucket in range, overriding the engine default.
    #[serde(default)]
    pub fill_gaps: Option<bool>,
}

impl AggregateRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Whether any grouping (field or date bucket) was requested.
    pub fn is_grouped(&self) -> bool {
        self.group_by.date.is_some() || !self.group_by.fields.is_empty()
    }
}

/// Aggregate formulas and the field they apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcSpec {
    #[serde(default = "default_formula")]
    pub formula: Vec<String>,
    #[serde(default)]
    pub field: FieldSpec,
}

fn default_formula() -> Vec<String> {
    vec!["count".to_string()]
}

impl Default for CalcSpec {
    fn default() -> Self {
        Self {
            formula: default_formula(),
            field: FieldSpec::default(),
        }
    }
}

/// Grouping dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupBySpec {
    #[serde(default)]
    pub date: Option<DateBucketSpec>,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Calendar bucketing of a timestamp column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucketSpec {
    pub field: String,
    #[serde(alias = "group_by")]
    pub granularity: String,
}

/// Row filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Column equality filters.
    #[serde(default)]
    pub fields: Row,
    #[serde(default)]
    pub period: Option<PeriodFilter>,
}

/// Engine output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateResponse {
    /// No grouping requested: a single scalar.
    Total { total: Value },
    /// Grouped rows, reshaped for charting unless `raw` was set.
    Series { data: Vec<Row>, keys: Vec<String> },
}

impl AggregateResponse {
    pub fn total(&self) -> Option<&Value> {
        match self {
            AggregateResponse::Total { total } => Some(total),
            AggregateResponse::Series { .. } => None,
        }
    }

    pub fn data(&self) -> &[Row] {
        match self {
            AggregateResponse::Total { .. } => &[],
            AggregateResponse::Series { data, .. } => data,
        }
    }

    pub fn keys(&self) -> &[String] {
        match self {
            AggregateResponse::Total { .. } => &[],
            AggregateResponse::Series { keys, .. } => keys,
        }
    }
}
