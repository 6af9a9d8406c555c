//! End-to-end aggregation pipeline.
//!
//! ```text
//! request ─► PlanBuilder ─► LogicalPlan ─► DataSource ─► rows ─► reshape ─► response
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::TryStreamExt;

use crate::error::EngineResult;
use crate::model::types::StorageMode;
use crate::planner::logical::{PlanBuilder, PlanContext, PlanOutput, PlannedQuery, TOTAL_ALIAS};
use crate::query::{AggregateRequest, AggregateResponse};
use crate::reshape::{self, GapFill, ReshapeSpec, Reshaped};
use crate::source::{Catalog, DataSource};
use crate::value::{Row, Value};

/// Engine-wide defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineOptions {
    /// Densify date buckets unless the request says otherwise.
    pub fill_gaps: bool,
    /// Hard cap on grouped rows.
    pub max_limit: Option<u64>,
}

/// Runs aggregation requests against the sources of a catalog.
///
/// The engine holds no per-request state; one instance serves any number of
/// concurrent requests.
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<dyn Catalog>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(catalog: impl Catalog + 'static) -> Self {
        Self::from_arc(Arc::new(catalog))
    }

    pub fn from_arc(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Plan a request without executing it.
    pub fn plan(
        &self,
        request: &AggregateRequest,
        timezone: Tz,
        now: DateTime<Utc>,
        storage: StorageMode,
    ) -> EngineResult<PlannedQuery> {
        let ctx = PlanContext::new(timezone, now, storage).with_max_limit(self.options.max_limit);
        PlanBuilder::new(&ctx).build(request)
    }

    /// Execute a request in the given display timezone.
    ///
    /// Returns `Ok(None)` when no source serves the requested model.
    pub async fn execute(
        &self,
        request: &AggregateRequest,
        timezone: Tz,
    ) -> EngineResult<Option<AggregateResponse>> {
        self.execute_at(request, timezone, Utc::now()).await
    }

    /// Execute a request with an explicit "now" for relative dates.
    pub async fn execute_at(
        &self,
        request: &AggregateRequest,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<AggregateResponse>> {
        let Some(source) = self.catalog.resolve(&request.model) else {
            tracing::debug!(model = %request.model, "no source for model");
            return Ok(None);
        };

        let planned = self.plan(request, timezone, now, source.storage())?;
        tracing::debug!(model = %request.model, plan = %planned.plan, "executing plan");

        let response = match planned.output {
            PlanOutput::Total => self.total(source.as_ref(), &planned).await?,
            PlanOutput::Grouped => self.grouped(source.as_ref(), request, &planned).await?,
        };
        Ok(Some(response))
    }

    async fn total(
        &self,
        source: &dyn DataSource,
        planned: &PlannedQuery,
    ) -> EngineResult<AggregateResponse> {
        let row = source.aggregate(&planned.plan).await?;
        let total = row.get(TOTAL_ALIAS).cloned().unwrap_or(Value::Null);
        tracing::info!(model = source.name(), %total, "aggregated total");
        Ok(AggregateResponse::Total { total })
    }

    async fn grouped(
        &self,
        source: &dyn DataSource,
        request: &AggregateRequest,
        planned: &PlannedQuery,
    ) -> EngineResult<AggregateResponse> {
        let rows: Vec<Row> = source.execute(&planned.plan).await?.try_collect().await?;
        let grouped = rows.len();

        let mut result = if rows.is_empty() {
            Reshaped::default()
        } else if request.raw {
            Reshaped {
                data: rows,
                keys: planned.dimensions.clone(),
            }
        } else {
            let spec = ReshapeSpec::from_plan(planned);
            let mut reshaped = reshape::reshape(&rows, &spec);
            if request.fill_gaps.unwrap_or(self.options.fill_gaps) {
                let gaps = planned
                    .bucket
                    .as_ref()
                    .and_then(|bucket| GapFill::for_bucket(bucket, planned.period.as_ref()));
                if let Some(gaps) = gaps {
                    reshape::fill_gaps(&mut reshaped, &spec, &gaps);
                }
            }
            reshaped
        };

        if let Some(labels) = &request.keys {
            reshape::translate_keys(&mut result, labels);
        }

        tracing::info!(
            model = source.name(),
            grouped,
            rows = result.data.len(),
            keys = result.keys.len(),
            raw = request.raw,
            "aggregated series"
        );

        Ok(AggregateResponse::Series {
            data: result.data,
            keys: result.keys,
        })
    }
}
