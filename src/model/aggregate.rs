//! Aggregate functions.

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Aggregate functions a metric can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Variance,
    StdDev,
}

/// Output type forced on an aggregate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// Whatever the aggregate naturally produces.
    Native,
    /// Always a float, never a fixed-point or integer value.
    Float,
}

impl AggregateFn {
    pub const ALL: [AggregateFn; 7] = [
        AggregateFn::Count,
        AggregateFn::Sum,
        AggregateFn::Avg,
        AggregateFn::Min,
        AggregateFn::Max,
        AggregateFn::Variance,
        AggregateFn::StdDev,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Variance => "variance",
            AggregateFn::StdDev => "stddev",
        }
    }

    /// `sum` is forced to float so decimals never leak into chart values.
    pub fn output_type(&self) -> OutputType {
        match self {
            AggregateFn::Sum => OutputType::Float,
            _ => OutputType::Native,
        }
    }

    /// Whether an empty bucket reads as zero rather than NULL.
    pub fn zero_when_empty(&self) -> bool {
        matches!(self, AggregateFn::Count | AggregateFn::Sum)
    }
}

impl FromStr for AggregateFn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(AggregateFn::Count),
            "sum" => Ok(AggregateFn::Sum),
            "avg" | "average" => Ok(AggregateFn::Avg),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            "variance" => Ok(AggregateFn::Variance),
            "stddev" | "std dev" | "std_dev" => Ok(AggregateFn::StdDev),
            _ => Err(EngineError::UnknownAggregate(s.to_string())),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
