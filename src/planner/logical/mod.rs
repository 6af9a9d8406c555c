//! Logical planning - converts an aggregation request to an operation tree.

mod builder;
mod plan;

pub use builder::{
    parse_formulas, BucketInfo, PlanBuilder, PlanContext, PlanOutput, PlannedQuery, BUCKET_PREFIX,
    TOTAL_ALIAS,
};
pub use plan::*;
