//! Metric expressions.
//!
//! A metric's `field` is either a single column name or a token list that
//! alternates columns and arithmetic operators, e.g. `["price", "*", "qty"]`.
//! Token lists are folded strictly left to right into a typed AST; there is
//! no operator precedence, so `["a", "+", "b", "*", "c"]` means `(a + b) * c`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::value::{Row, Value};

/// Column whose metric is always a plain row count.
pub const ROW_ID: &str = "id";

// =============================================================================
// Field specification (request side)
// =============================================================================

/// The `field` half of a metric request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    /// A single column name.
    Column(String),
    /// Columns interleaved with operators.
    Tokens(Vec<String>),
}

impl Default for FieldSpec {
    fn default() -> Self {
        FieldSpec::Column(ROW_ID.to_string())
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        FieldSpec::Column(name.to_string())
    }
}

impl<S: Into<String>> From<Vec<S>> for FieldSpec {
    fn from(tokens: Vec<S>) -> Self {
        FieldSpec::Tokens(tokens.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// AST
// =============================================================================

/// Arithmetic operators accepted in a field token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Operator {
    /// Parse an operator token. Anything else is a column name.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "/" => Some(Operator::Div),
            "^" => Some(Operator::Pow),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Pow => "^",
        }
    }

    /// Apply the operator. Division by zero yields NULL, as in SQL.
    pub fn apply(&self, left: f64, right: f64) -> Option<f64> {
        match self {
            Operator::Add => Some(left + right),
            Operator::Sub => Some(left - right),
            Operator::Mul => Some(left * right),
            Operator::Div if right == 0.0 => None,
            Operator::Div => Some(left / right),
            Operator::Pow => Some(left.powf(right)),
        }
    }
}

/// Arithmetic expression over row columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Binary {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn binary(left: Expr, op: Operator, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Columns referenced by the expression, left to right.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Expr::Field(name) => vec![name.as_str()],
            Expr::Binary { left, right, .. } => {
                let mut cols = left.columns();
                cols.extend(right.columns());
                cols
            }
        }
    }

    /// Evaluate against a row. Missing, NULL or non-numeric inputs yield `None`.
    pub fn evaluate(&self, row: &Row) -> Option<f64> {
        match self {
            Expr::Field(name) => row.get(name.as_str()).and_then(Value::as_f64),
            Expr::Binary { left, op, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                op.apply(l, r)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Field(name) => write!(f, "{}", name),
            Expr::Binary { left, op, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
        }
    }
}

/// What a metric aggregates over.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricExpr {
    /// The `id` shortcut: every aggregate becomes a row count.
    RowCount,
    /// A single column, aggregated with its native type.
    Column(String),
    /// An arithmetic combination of columns, always floating point.
    Arithmetic(Expr),
}

impl MetricExpr {
    pub fn is_row_count(&self) -> bool {
        matches!(self, MetricExpr::RowCount)
    }

    /// Per-row input to the aggregate.
    pub fn evaluate(&self, row: &Row) -> Value {
        match self {
            MetricExpr::RowCount => row.get(ROW_ID).cloned().unwrap_or(Value::Int(1)),
            MetricExpr::Column(name) => row.get(name.as_str()).cloned().unwrap_or(Value::Null),
            MetricExpr::Arithmetic(expr) => expr.evaluate(row).map(Value::Float).unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for MetricExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricExpr::RowCount => write!(f, "*"),
            MetricExpr::Column(name) => write!(f, "{}", name),
            MetricExpr::Arithmetic(expr) => write!(f, "{}", expr),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Build the metric expression for a field spec.
pub fn build_metric(field: &FieldSpec) -> EngineResult<MetricExpr> {
    match field {
        FieldSpec::Column(name) if name == ROW_ID => Ok(MetricExpr::RowCount),
        FieldSpec::Column(name) if name.is_empty() => Err(EngineError::InvalidExpression(
            "field name is empty".to_string(),
        )),
        FieldSpec::Column(name) => Ok(MetricExpr::Column(name.clone())),
        FieldSpec::Tokens(tokens) => build_arithmetic(tokens).map(MetricExpr::Arithmetic),
    }
}

/// Fold a token list into a left-deep expression tree.
pub fn build_arithmetic(tokens: &[String]) -> EngineResult<Expr> {
    let mut iter = tokens.iter().enumerate();

    let mut expr = match iter.next() {
        Some((pos, token)) => operand(pos, token)?,
        None => {
            return Err(EngineError::InvalidExpression(
                "field list is empty".to_string(),
            ))
        }
    };

    while let Some((pos, token)) = iter.next() {
        let op = Operator::from_token(token).ok_or_else(|| {
            EngineError::InvalidExpression(format!(
                "expected operator at position {}, found column '{}'",
                pos, token
            ))
        })?;
        let (pos, token) = iter.next().ok_or_else(|| {
            EngineError::InvalidExpression(format!("field list ends with operator '{}'", token))
        })?;
        expr = Expr::binary(expr, op, operand(pos, token)?);
    }

    Ok(expr)
}

fn operand(pos: usize, token: &str) -> EngineResult<Expr> {
    if Operator::from_token(token).is_some() {
        return Err(EngineError::InvalidExpression(format!(
            "expected column at position {}, found operator '{}'",
            pos, token
        )));
    }
    if token.is_empty() {
        return Err(EngineError::InvalidExpression(format!(
            "empty column name at position {}",
            pos
        )));
    }
    Ok(Expr::field(token))
}
