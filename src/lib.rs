//! # Tally
//!
//! A dynamic aggregation engine that turns declarative metric requests into
//! chart-ready series.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  AggregateRequest (JSON)                 │
//! │   (model, calc, group_by, filter_by, order, keys ...)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [model: expr, calendar, dates]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Metric expression + bucketer + period bounds      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │   LogicalPlan: Scan → Filter → Bucket → Aggregate →      │
//! │                Sort → Limit → Project                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [source]
//! ┌─────────────────────────────────────────────────────────┐
//! │               DataSource (async row stream)              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [reshape]
//! ┌─────────────────────────────────────────────────────────┐
//! │           {total} or {data, keys} response               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tally::prelude::*;
//!
//! let catalog = SourceCatalog::new().with_source(MemorySource::new("sales_Order", rows));
//! let engine = Engine::new(catalog);
//!
//! let request: AggregateRequest = serde_json::from_str(r#"{
//!     "model": "sales_Order",
//!     "calc": {"formula": ["sum"], "field": ["price", "*", "quantity"]},
//!     "group_by": {"date": {"field": "created_at", "granularity": "month"}}
//! }"#)?;
//!
//! let response = engine.execute(&request, chrono_tz::Europe::Paris).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod planner;
pub mod query;
pub mod reshape;
pub mod source;
pub mod value;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::engine::{Engine, EngineOptions};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::model::{AggregateFn, Granularity, PeriodFilter, StorageMode};
    pub use crate::planner::{LogicalPlan, PlanBuilder, PlanContext};
    pub use crate::query::{AggregateRequest, AggregateResponse};
    pub use crate::source::{Catalog, DataSource, MemorySource, SourceCatalog};
    pub use crate::value::{Row, Value};
}

// Also export at crate root for convenience
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use query::{AggregateRequest, AggregateResponse};
pub use value::{Row, Value};
