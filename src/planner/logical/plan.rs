//! Logical plan node types.

use std::fmt;

use crate::model::aggregate::{AggregateFn, OutputType};
use crate::model::calendar::{Bucketer, Granularity};
use crate::model::expr::MetricExpr;
use crate::value::Value;

/// Logical plan - the operation tree a data source executes.
///
/// Nodes nest innermost-first: `Scan → Filter → Bucket → Aggregate → Sort →
/// Limit → Project`. Optional stages are simply absent.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Scan(ScanNode),
    Filter(FilterNode),
    Bucket(BucketNode),
    Aggregate(AggregateNode),
    Sort(SortNode),
    Limit(LimitNode),
    Project(ProjectNode),
}

/// Scan a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub model: String,
    /// Opaque source-specific clause, forwarded untouched.
    pub extra: Option<serde_json::Value>,
}

/// Filter rows. All predicates must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub input: Box<LogicalPlan>,
    pub predicates: Vec<Predicate>,
}

/// Row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq { column: String, value: Value },
    /// Inclusive lower bound.
    Gte { column: String, value: Value },
    /// Inclusive upper bound.
    Lte { column: String, value: Value },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::Eq { column, .. }
            | Predicate::Gte { column, .. }
            | Predicate::Lte { column, .. } => column,
        }
    }
}

/// Annotate rows with a calendar bucket key.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketNode {
    pub input: Box<LogicalPlan>,
    /// Synthetic output column, `extracted_<column>`.
    pub alias: String,
    pub column: String,
    pub granularity: Granularity,
    pub bucketer: Bucketer,
}

/// Aggregate, optionally per group.
///
/// With an empty `group_by` the node yields exactly one row, even over an
/// empty input.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub input: Box<LogicalPlan>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggregateItem>,
    /// Columns carried from the first row of each group.
    pub passthrough: Vec<String>,
}

/// One aggregate result column.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateItem {
    pub alias: String,
    pub func: AggregateFn,
    pub expr: MetricExpr,
    pub distinct: bool,
    pub output: OutputType,
}

/// Sort rows (ORDER BY).
#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    pub input: Box<LogicalPlan>,
    pub order_by: Vec<OrderRef>,
}

/// ORDER BY reference.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRef {
    pub column: String,
    pub descending: bool,
}

impl OrderRef {
    /// Parse an order key; a leading `-` means descending.
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(column) => Self {
                column: column.to_string(),
                descending: true,
            },
            None => Self {
                column: key.to_string(),
                descending: false,
            },
        }
    }
}

/// Limit rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitNode {
    pub input: Box<LogicalPlan>,
    pub limit: u64,
}

/// Project columns (SELECT).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub input: Box<LogicalPlan>,
    pub columns: Vec<String>,
}

impl LogicalPlan {
    /// The node this one reads from, if any.
    pub fn input(&self) -> Option<&LogicalPlan> {
        match self {
            LogicalPlan::Scan(_) => None,
            LogicalPlan::Filter(node) => Some(&node.input),
            LogicalPlan::Bucket(node) => Some(&node.input),
            LogicalPlan::Aggregate(node) => Some(&node.input),
            LogicalPlan::Sort(node) => Some(&node.input),
            LogicalPlan::Limit(node) => Some(&node.input),
            LogicalPlan::Project(node) => Some(&node.input),
        }
    }

    /// The scanned model.
    pub fn scan(&self) -> &ScanNode {
        match self {
            LogicalPlan::Scan(node) => node,
            LogicalPlan::Filter(node) => node.input.scan(),
            LogicalPlan::Bucket(node) => node.input.scan(),
            LogicalPlan::Aggregate(node) => node.input.scan(),
            LogicalPlan::Sort(node) => node.input.scan(),
            LogicalPlan::Limit(node) => node.input.scan(),
            LogicalPlan::Project(node) => node.input.scan(),
        }
    }

    /// First aggregate node on the path to the scan.
    pub fn aggregate(&self) -> Option<&AggregateNode> {
        match self {
            LogicalPlan::Aggregate(node) => Some(node),
            other => other.input().and_then(LogicalPlan::aggregate),
        }
    }

    fn label(&self) -> String {
        match self {
            LogicalPlan::Scan(node) => match &node.extra {
                Some(extra) => format!("Scan: {} extra={}", node.model, extra),
                None => format!("Scan: {}", node.model),
            },
            LogicalPlan::Filter(node) => {
                let preds: Vec<String> = node.predicates.iter().map(|p| p.to_string()).collect();
                format!("Filter: {}", preds.join(" AND "))
            }
            LogicalPlan::Bucket(node) => format!(
                "Bucket: {} = {}({}) [{}]",
                node.alias, node.granularity, node.column, node.bucketer
            ),
            LogicalPlan::Aggregate(node) => {
                let aggs: Vec<String> = node.aggregates.iter().map(|a| a.to_string()).collect();
                let mut label = format!(
                    "Aggregate: group_by=[{}] aggregates=[{}]",
                    node.group_by.join(", "),
                    aggs.join(", ")
                );
                if !node.passthrough.is_empty() {
                    label.push_str(&format!(" passthrough=[{}]", node.passthrough.join(", ")));
                }
                label
            }
            LogicalPlan::Sort(node) => {
                let keys: Vec<String> = node
                    .order_by
                    .iter()
                    .map(|o| format!("{} {}", o.column, if o.descending { "DESC" } else { "ASC" }))
                    .collect();
                format!("Sort: {}", keys.join(", "))
            }
            LogicalPlan::Limit(node) => format!("Limit: {}", node.limit),
            LogicalPlan::Project(node) => format!("Project: {}", node.columns.join(", ")),
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut node = Some(self);
        while let Some(current) = node {
            if depth > 0 {
                writeln!(f)?;
            }
            write!(f, "{:indent$}{}", "", current.label(), indent = depth * 2)?;
            depth += 1;
            node = current.input();
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq { column, value } => write!(f, "{} = {}", column, quoted(value)),
            Predicate::Gte { column, value } => write!(f, "{} >= {}", column, quoted(value)),
            Predicate::Lte { column, value } => write!(f, "{} <= {}", column, quoted(value)),
        }
    }
}

impl fmt::Display for AggregateItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let cast = match self.output {
            OutputType::Float => "::float",
            OutputType::Native => "",
        };
        write!(
            f,
            "{}({}{}){} AS {}",
            self.func, distinct, self.expr, cast, self.alias
        )
    }
}

fn quoted(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => value.to_string(),
        other => format!("'{}'", other),
    }
}
