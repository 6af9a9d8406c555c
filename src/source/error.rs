//! Errors raised by data sources.

use thiserror::Error;

/// Result type for data source operations.
pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Type mismatch in {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Failed to load rows: {0}")]
    Load(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
