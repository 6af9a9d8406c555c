//! Error taxonomy for the aggregation pipeline.
//!
//! Every variant is fatal for the request that raised it. The engine never
//! retries and never degrades to a partial result.

use thiserror::Error;

use crate::source::SourceError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to the caller of [`crate::engine::Engine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed arithmetic field list (leading/trailing or doubled operator,
    /// adjacent columns, empty list).
    #[error("Invalid metric expression: {0}")]
    InvalidExpression(String),

    /// Date bucket granularity outside the supported set.
    #[error("Unsupported granularity: {0}")]
    UnsupportedGranularity(String),

    /// Aggregate formula name that maps to no aggregate function.
    #[error("Unknown aggregate function: {0}")]
    UnknownAggregate(String),

    /// Request that is well-formed JSON but cannot be planned.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failure inside the data source, propagated unchanged.
    #[error(transparent)]
    DataSource(#[from] SourceError),
}
