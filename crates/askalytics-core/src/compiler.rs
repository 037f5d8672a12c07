use serde::{Deserialize, Serialize};

use askalytics_schema::{
    ClampNotice, ClampSlot, DateRange, Granularity, IntentResult, OrderBy, ParameterSet,
    QueryContext, QueryDescriptor, QueryIntent,
};

/// Trend buckets switch from daily to weekly past this span.
pub const TREND_WEEKLY_THRESHOLD_DAYS: i64 = 90;

const CONVERSION_CAPABLE: &[&str] = &["conversions", "sessionConversionRate", "totalRevenue"];

/// Hard cost bounds. A request exactly at a cap passes untouched; one
/// past it is clamped and the clamp recorded on the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerLimits {
    pub max_span_days: i64,
    pub max_row_limit: u32,
}

impl Default for CompilerLimits {
    fn default() -> Self {
        Self {
            max_span_days: 365,
            max_row_limit: 1000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("incompatible parameters for {intent} intent: {slot}: {detail}")]
    IncompatibleIntentParameters {
        intent: QueryIntent,
        slot: &'static str,
        detail: String,
    },
}

impl CompileError {
    fn incompatible(intent: QueryIntent, slot: &'static str, detail: impl Into<String>) -> Self {
        Self::IncompatibleIntentParameters {
            intent,
            slot,
            detail: detail.into(),
        }
    }

    pub fn slot(&self) -> &'static str {
        match self {
            Self::IncompatibleIntentParameters { slot, .. } => slot,
        }
    }
}

/// Merge intent and parameters into a canonical descriptor, filling
/// intent defaults and applying cost bounds. This is the only component
/// before execution that may reject a request; everything it emits is
/// executable by the router as-is.
pub fn compile(
    intent_result: &IntentResult,
    params: ParameterSet,
    ctx: &QueryContext,
    limits: &CompilerLimits,
) -> Result<QueryDescriptor, CompileError> {
    let intent = intent_result.intent;
    let mut clamps: Vec<ClampNotice> = Vec::new();

    if params.date_range.start > params.date_range.end {
        return Err(CompileError::incompatible(
            intent,
            "date_range",
            format!("starts after it ends ({})", params.date_range),
        ));
    }
    let primary = clamp_span(params.date_range, limits, &mut clamps);

    let comparison = match intent {
        QueryIntent::Comparison => {
            let range = params.comparison_range.ok_or_else(|| {
                CompileError::incompatible(
                    intent,
                    "comparison_range",
                    "no resolvable second window",
                )
            })?;
            if range.start > range.end {
                return Err(CompileError::incompatible(
                    intent,
                    "comparison_range",
                    format!("starts after it ends ({range})"),
                ));
            }
            let range = clamp_span(range, limits, &mut clamps);
            if range.overlaps(&primary) {
                return Err(CompileError::incompatible(
                    intent,
                    "comparison_range",
                    format!("overlaps the primary window ({primary} vs {range})"),
                ));
            }
            Some(range)
        }
        // A detected comparison window on a non-comparison intent is
        // dropped here; the extractor reports, the compiler reconciles.
        _ => None,
    };

    if intent == QueryIntent::Conversion
        && !params.metrics.is_empty()
        && !params
            .metrics
            .iter()
            .any(|m| CONVERSION_CAPABLE.contains(&m.as_str()))
    {
        return Err(CompileError::incompatible(
            intent,
            "metrics",
            format!(
                "none of [{}] can measure conversions",
                params.metrics.join(", ")
            ),
        ));
    }

    let metrics: Vec<String> = if params.metrics.is_empty() {
        intent
            .canonical_metrics()
            .iter()
            .map(|m| m.to_string())
            .collect()
    } else {
        params.metrics
    };

    let mut dimensions = params.dimensions;
    let mut trend_buckets: Option<u32> = None;
    match intent {
        QueryIntent::PageAnalysis => {
            if dimensions.is_empty() {
                dimensions.push("pagePath".to_string());
            }
        }
        QueryIntent::TrafficSource => {
            if dimensions.is_empty() {
                dimensions.push("sessionDefaultChannelGrouping".to_string());
            }
        }
        QueryIntent::Trend => {
            let granularity = params.granularity.unwrap_or_else(|| {
                if primary.span_days() <= TREND_WEEKLY_THRESHOLD_DAYS {
                    Granularity::Daily
                } else {
                    Granularity::Weekly
                }
            });
            let time_dimension = granularity.time_dimension();
            dimensions.retain(|d| d != "date" && d != "week");
            dimensions.insert(0, time_dimension.to_string());

            let span = primary.span_days();
            let buckets = match granularity {
                Granularity::Daily => span,
                Granularity::Weekly => (span + 6) / 7,
            };
            trend_buckets = u32::try_from(buckets).ok();
        }
        QueryIntent::BasicMetric
        | QueryIntent::UserBehavior
        | QueryIntent::Conversion
        | QueryIntent::Comparison => {}
    }

    let requested_limit = params
        .row_limit
        .or(trend_buckets)
        .unwrap_or(ctx.default_row_limit)
        .max(1);
    let limit = if requested_limit > limits.max_row_limit {
        clamps.push(ClampNotice {
            slot: ClampSlot::RowLimit,
            requested: u64::from(requested_limit),
            applied: u64::from(limits.max_row_limit),
        });
        limits.max_row_limit
    } else {
        requested_limit
    };

    let order_by = match intent {
        QueryIntent::PageAnalysis | QueryIntent::TrafficSource => Some(OrderBy {
            metric: metrics[0].clone(),
            descending: true,
        }),
        _ => None,
    };

    let mut date_ranges = vec![primary];
    if let Some(range) = comparison {
        date_ranges.push(range);
    }

    Ok(QueryDescriptor {
        intent,
        property_id: ctx.property_id.clone(),
        date_ranges,
        metrics,
        dimensions,
        filters: params.filters,
        order_by,
        limit,
        clamps,
    })
}

fn clamp_span(range: DateRange, limits: &CompilerLimits, clamps: &mut Vec<ClampNotice>) -> DateRange {
    let span = range.span_days();
    if span <= limits.max_span_days {
        return range;
    }
    clamps.push(ClampNotice {
        slot: ClampSlot::DateSpan,
        requested: span as u64,
        applied: limits.max_span_days as u64,
    });
    DateRange::ending_at(range.end, limits.max_span_days)
}
