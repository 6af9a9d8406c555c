//! Data sources.
//!
//! The engine never touches storage directly. It hands a [`LogicalPlan`] to a
//! [`DataSource`], which filters, buckets, aggregates, orders, limits and
//! projects, then streams the resulting rows back. Models are looked up by
//! name through a [`Catalog`].

mod error;
pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

pub use error::{SourceError, SourceResult};
pub use memory::MemorySource;

use crate::model::types::StorageMode;
use crate::planner::LogicalPlan;
use crate::value::Row;

/// Rows produced by a data source, in output order.
pub type RowStream<'a> = BoxStream<'a, SourceResult<Row>>;

/// A tabular data source able to execute logical plans.
///
/// # Example
///
/// ```ignore
/// use futures::TryStreamExt;
///
/// async fn dump(source: &dyn DataSource, plan: &LogicalPlan) -> SourceResult<()> {
///     let mut rows = source.execute(plan).await?;
///     while let Some(row) = rows.try_next().await? {
///         println!("{:?}", row);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Model name this source serves.
    fn name(&self) -> &str;

    /// Whether stored timestamps carry timezone information.
    fn storage(&self) -> StorageMode {
        StorageMode::Aware
    }

    /// Execute a plan and stream its rows.
    ///
    /// Dropping the stream before it is exhausted abandons the query.
    async fn execute<'a>(&'a self, plan: &'a LogicalPlan) -> SourceResult<RowStream<'a>>;

    /// Execute an ungrouped plan and return its single row.
    ///
    /// Default implementation takes the first row of [`execute`](Self::execute).
    async fn aggregate(&self, plan: &LogicalPlan) -> SourceResult<Row> {
        let mut rows = self.execute(plan).await?;
        Ok(rows.try_next().await?.unwrap_or_default())
    }
}

/// Resolves model names to data sources.
pub trait Catalog: Send + Sync {
    /// `None` when no source serves the model.
    fn resolve(&self, model: &str) -> Option<Arc<dyn DataSource>>;
}

/// Catalog backed by a name → source map.
#[derive(Default, Clone)]
pub struct SourceCatalog {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name.
    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn with_source(mut self, source: impl DataSource + 'static) -> Self {
        self.register(Arc::new(source));
        self
    }

    pub fn models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl fmt::Debug for SourceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCatalog")
            .field("models", &self.models())
            .finish()
    }
}

impl Catalog for SourceCatalog {
    fn resolve(&self, model: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(model).cloned()
    }
}
