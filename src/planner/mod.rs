//! Aggregation planner.
//!
//! Turns an [`AggregateRequest`](crate::query::AggregateRequest) into a
//! [`LogicalPlan`](logical::LogicalPlan):
//!
//! ```text
//! Scan → Filter → Bucket? → Aggregate → Sort? → Limit? → Project
//! ```
//!
//! Ordering always sits below limiting so a limit keeps the first rows of
//! the requested order. Requests without any grouping plan to a single
//! ungrouped aggregate instead.

pub mod logical;

pub use logical::{LogicalPlan, PlanBuilder, PlanContext, PlanOutput, PlannedQuery};
