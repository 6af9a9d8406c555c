//! Metric model: expressions, aggregates, calendar buckets and periods.

pub mod aggregate;
pub mod calendar;
pub mod dates;
pub mod expr;
pub mod types;

pub use aggregate::{AggregateFn, OutputType};
pub use calendar::{Bucketer, Granularity};
pub use dates::{DateResolver, Delta, DeltaUnit, PeriodFilter, ResolvedPeriod};
pub use expr::{build_metric, Expr, FieldSpec, MetricExpr, Operator};
pub use types::StorageMode;
