//! Build logical plans from aggregation requests.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{EngineError, EngineResult};
use crate::model::aggregate::AggregateFn;
use crate::model::calendar::{Bucketer, Granularity};
use crate::model::dates::{DateResolver, ResolvedPeriod};
use crate::model::expr::{build_metric, MetricExpr};
use crate::model::types::StorageMode;
use crate::planner::logical::{
    AggregateItem, AggregateNode, BucketNode, FilterNode, LimitNode, LogicalPlan, OrderRef,
    Predicate, ProjectNode, ScanNode, SortNode,
};
use crate::query::AggregateRequest;
use crate::value::Row;

/// Result column of the ungrouped total.
pub const TOTAL_ALIAS: &str = "aggregated_total";

/// Prefix of the synthetic date bucket column.
pub const BUCKET_PREFIX: &str = "extracted_";

/// Per-request planning context.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext {
    pub timezone: Tz,
    pub now: DateTime<Utc>,
    pub storage: StorageMode,
    /// Hard cap applied on top of the request limit.
    pub max_limit: Option<u64>,
}

impl PlanContext {
    pub fn new(timezone: Tz, now: DateTime<Utc>, storage: StorageMode) -> Self {
        Self {
            timezone,
            now,
            storage,
            max_limit: None,
        }
    }

    pub fn with_max_limit(mut self, max_limit: Option<u64>) -> Self {
        self.max_limit = max_limit;
        self
    }
}

/// How the plan's rows turn into a response.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutput {
    /// One row holding [`TOTAL_ALIAS`].
    Total,
    /// Grouped rows for the reshaper.
    Grouped,
}

/// Date bucket chosen for the request.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketInfo {
    pub alias: String,
    /// Source timestamp column.
    pub column: String,
    pub granularity: Granularity,
    pub bucketer: Bucketer,
}

/// A planned request: the plan plus what the reshaper needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub plan: LogicalPlan,
    pub output: PlanOutput,
    /// Effective dimensions, bucket column first.
    pub dimensions: Vec<String>,
    pub aggregates: Vec<AggregateItem>,
    pub additional_fields: Vec<String>,
    pub period: Option<ResolvedPeriod>,
    pub bucket: Option<BucketInfo>,
}

pub struct PlanBuilder<'a> {
    ctx: &'a PlanContext,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(ctx: &'a PlanContext) -> Self {
        Self { ctx }
    }

    pub fn build(&self, request: &AggregateRequest) -> EngineResult<PlannedQuery> {
        let metric = build_metric(&request.calc.field)?;
        let formulas = parse_formulas(&request.calc.formula)?;

        let resolver = DateResolver::new(self.ctx.timezone, self.ctx.now, self.ctx.storage);
        let period = request
            .filter_by
            .period
            .as_ref()
            .map(|p| p.resolve(&resolver))
            .transpose()?;

        let mut plan = LogicalPlan::Scan(ScanNode {
            model: request.model.clone(),
            extra: request.extra.clone(),
        });

        let predicates = build_predicates(&request.filter_by.fields, period.as_ref());
        if !predicates.is_empty() {
            plan = LogicalPlan::Filter(FilterNode {
                input: Box::new(plan),
                predicates,
            });
        }

        if !request.is_grouped() {
            return Ok(self.build_total(plan, request, metric, &formulas, period));
        }

        self.build_grouped(plan, request, metric, &formulas, period)
    }

    fn build_total(
        &self,
        input: LogicalPlan,
        request: &AggregateRequest,
        metric: MetricExpr,
        formulas: &[(String, AggregateFn)],
        period: Option<ResolvedPeriod>,
    ) -> PlannedQuery {
        let (_, func) = &formulas[0];
        let item = AggregateItem {
            alias: TOTAL_ALIAS.to_string(),
            func: *func,
            expr: metric,
            distinct: request.distinct,
            output: func.output_type(),
        };

        let plan = LogicalPlan::Aggregate(AggregateNode {
            input: Box::new(input),
            group_by: vec![],
            aggregates: vec![item.clone()],
            passthrough: vec![],
        });

        tracing::debug!(model = %request.model, "planned ungrouped total");

        PlannedQuery {
            plan,
            output: PlanOutput::Total,
            dimensions: vec![],
            aggregates: vec![item],
            additional_fields: vec![],
            period,
            bucket: None,
        }
    }

    fn build_grouped(
        &self,
        mut plan: LogicalPlan,
        request: &AggregateRequest,
        metric: MetricExpr,
        formulas: &[(String, AggregateFn)],
        period: Option<ResolvedPeriod>,
    ) -> EngineResult<PlannedQuery> {
        let mut dimensions = request.group_by.fields.clone();
        let mut order_by: Vec<OrderRef> = request.order.iter().map(|k| OrderRef::parse(k)).collect();
        let mut bucket = None;

        if let Some(date) = &request.group_by.date {
            let granularity: Granularity = date.granularity.parse()?;
            let alias = format!("{}{}", BUCKET_PREFIX, date.field);
            let bucketer =
                Bucketer::for_storage(self.ctx.timezone, self.ctx.storage, self.ctx.now);

            tracing::debug!(
                column = %date.field,
                granularity = %granularity,
                offset_seconds = bucketer.offset_seconds(),
                "bucketing date column"
            );

            plan = LogicalPlan::Bucket(BucketNode {
                input: Box::new(plan),
                alias: alias.clone(),
                column: date.field.clone(),
                granularity,
                bucketer,
            });

            if !order_by.is_empty() {
                order_by.insert(
                    0,
                    OrderRef {
                        column: alias.clone(),
                        descending: false,
                    },
                );
            }
            dimensions.insert(0, alias.clone());
            bucket = Some(BucketInfo {
                alias,
                column: date.field.clone(),
                granularity,
                bucketer,
            });
        }

        let aggregates: Vec<AggregateItem> = formulas
            .iter()
            .map(|(alias, func)| AggregateItem {
                alias: alias.clone(),
                func: *func,
                expr: metric.clone(),
                distinct: request.distinct,
                output: func.output_type(),
            })
            .collect();

        plan = LogicalPlan::Aggregate(AggregateNode {
            input: Box::new(plan),
            group_by: dimensions.clone(),
            aggregates: aggregates.clone(),
            passthrough: request.additional_fields.clone(),
        });

        if !order_by.is_empty() {
            plan = LogicalPlan::Sort(SortNode {
                input: Box::new(plan),
                order_by,
            });
        }

        if let Some(limit) = self.effective_limit(request.limit) {
            plan = LogicalPlan::Limit(LimitNode {
                input: Box::new(plan),
                limit,
            });
        }

        let mut columns: Vec<String> = Vec::new();
        let aliases = aggregates.iter().map(|a| &a.alias);
        for column in dimensions.iter().chain(aliases).chain(&request.additional_fields) {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        plan = LogicalPlan::Project(ProjectNode {
            input: Box::new(plan),
            columns,
        });

        tracing::debug!(model = %request.model, dimensions = ?dimensions, "planned grouped query");

        Ok(PlannedQuery {
            plan,
            output: PlanOutput::Grouped,
            dimensions,
            aggregates,
            additional_fields: request.additional_fields.clone(),
            period,
            bucket,
        })
    }

    /// A zero request limit means "no limit".
    fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        match (requested.filter(|l| *l > 0), self.ctx.max_limit) {
            (Some(limit), Some(cap)) => Some(limit.min(cap)),
            (limit, cap) => limit.or(cap),
        }
    }
}

/// Parse formula names, keeping the caller's spelling as the result alias.
pub fn parse_formulas(names: &[String]) -> EngineResult<Vec<(String, AggregateFn)>> {
    if names.is_empty() {
        return Err(EngineError::InvalidRequest(
            "calc.formula must name at least one aggregate".to_string(),
        ));
    }
    names
        .iter()
        .map(|name| Ok((name.trim().to_string(), name.parse::<AggregateFn>()?)))
        .collect()
}

fn build_predicates(fields: &Row, period: Option<&ResolvedPeriod>) -> Vec<Predicate> {
    let mut predicates: Vec<Predicate> = fields
        .iter()
        .map(|(column, value)| Predicate::Eq {
            column: column.clone(),
            value: value.clone(),
        })
        .collect();

    if let Some(period) = period {
        if let Some(start) = &period.start {
            predicates.push(Predicate::Gte {
                column: period.field.clone(),
                value: start.clone(),
            });
        }
        if let Some(end) = &period.end {
            predicates.push(Predicate::Lte {
                column: period.field.clone(),
                value: end.clone(),
            });
        }
    }

    predicates
}
