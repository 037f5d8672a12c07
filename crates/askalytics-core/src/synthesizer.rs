use askalytics_schema::{
    ExecutionResult, IntentResult, QueryDescriptor, QueryIntent, ReportRow, ResponseObject,
};

use crate::vocabulary;

/// Multiplicative confidence penalty per clamp notice. Confidence only
/// ever goes down from the classifier's score, never up.
const CLAMP_CONFIDENCE_FACTOR: f64 = 0.85;

/// Primary windows shorter than this earn a "widen the window" follow-up.
const SHORT_WINDOW_DAYS: i64 = 14;

const MAX_SUGGESTIONS: usize = 3;

/// Turn a successful execution into the caller-facing answer. Pure
/// function of its inputs: the same (intent, descriptor, result) triple
/// always yields the identical response object.
pub fn synthesize(
    intent: &IntentResult,
    descriptor: &QueryDescriptor,
    result: &ExecutionResult,
) -> ResponseObject {
    let mut confidence = intent.confidence;
    for _ in &descriptor.clamps {
        confidence *= CLAMP_CONFIDENCE_FACTOR;
    }
    confidence = confidence.clamp(0.0, 1.0);

    let response = if result.rows.is_empty() {
        format!(
            "No data was returned for {} between {} and {}.",
            descriptor.metrics.join(", "),
            descriptor.primary_range().start,
            descriptor.primary_range().end
        )
    } else {
        match descriptor.intent {
            QueryIntent::BasicMetric => basic_metric_text(descriptor, result),
            QueryIntent::PageAnalysis => ranked_text(descriptor, result, "pages"),
            QueryIntent::TrafficSource => traffic_source_text(descriptor, result),
            QueryIntent::UserBehavior => basic_metric_text(descriptor, result),
            QueryIntent::Conversion => basic_metric_text(descriptor, result),
            QueryIntent::Trend => trend_text(descriptor, result),
            QueryIntent::Comparison => comparison_text(descriptor, result),
        }
    };

    let suggestions = if result.rows.is_empty() {
        Vec::new()
    } else {
        suggestions(descriptor)
    };

    ResponseObject {
        response,
        confidence,
        query_type: descriptor.intent,
        execution_time: result.latency.as_secs_f64(),
        data: result.rows.clone(),
        suggestions,
    }
}

/// Follow-up questions derived from the descriptor by rule, deduplicated,
/// at most three, and only mentioning entities the query actually used.
fn suggestions(descriptor: &QueryDescriptor) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let lead_metric = descriptor
        .metrics
        .first()
        .map(String::as_str)
        .unwrap_or("sessions");

    if descriptor.primary_range().span_days() < SHORT_WINDOW_DAYS {
        out.push(format!(
            "Widen the window to the last 30 days for a steadier {lead_metric} picture"
        ));
    }

    if descriptor.dimensions.len() == 1 {
        if let Some(related) = vocabulary::related_dimension(&descriptor.dimensions[0]) {
            out.push(format!("Break this down by {related} as well"));
        }
    }

    if descriptor.intent == QueryIntent::Trend {
        out.push(format!(
            "Compare this period's {lead_metric} against the previous period"
        ));
    }

    let mut deduped: Vec<String> = Vec::new();
    for suggestion in out {
        if !deduped.contains(&suggestion) {
            deduped.push(suggestion);
        }
    }
    deduped.truncate(MAX_SUGGESTIONS);
    deduped
}

fn basic_metric_text(descriptor: &QueryDescriptor, result: &ExecutionResult) -> String {
    let rows: Vec<&ReportRow> = result.rows.iter().collect();
    let parts: Vec<String> = descriptor
        .metrics
        .iter()
        .take(4)
        .enumerate()
        .map(|(idx, metric)| {
            let value = aggregate_metric(&rows, idx, metric);
            format!("{metric} came to {}", fmt_num(value))
        })
        .collect();
    format!(
        "Between {} and {}, {}.",
        descriptor.primary_range().start,
        descriptor.primary_range().end,
        parts.join(", ")
    )
}

fn ranked_text(descriptor: &QueryDescriptor, result: &ExecutionResult, noun: &str) -> String {
    let lead_metric = &descriptor.metrics[0];
    let ranked = ranked_rows(&result.rows);
    let listed: Vec<String> = ranked
        .iter()
        .take(3)
        .enumerate()
        .map(|(position, row)| {
            let name = row
                .dimension_values
                .first()
                .map(String::as_str)
                .unwrap_or("(not set)");
            let value = row
                .metric_values
                .first()
                .map(String::as_str)
                .unwrap_or("0");
            format!("{}. {} ({})", position + 1, name, value)
        })
        .collect();
    format!(
        "Top {noun} by {lead_metric} between {} and {}: {}.",
        descriptor.primary_range().start,
        descriptor.primary_range().end,
        listed.join(", ")
    )
}

fn traffic_source_text(descriptor: &QueryDescriptor, result: &ExecutionResult) -> String {
    let lead_metric = &descriptor.metrics[0];
    let ranked = ranked_rows(&result.rows);
    let total: f64 = ranked.iter().map(|row| metric_value(row, 0)).sum();

    let listed: Vec<String> = ranked
        .iter()
        .take(3)
        .map(|row| {
            let name = row
                .dimension_values
                .first()
                .map(String::as_str)
                .unwrap_or("(not set)");
            let value = metric_value(row, 0);
            if total > 0.0 {
                format!(
                    "{name} {} ({:.1}% of total)",
                    fmt_num(value),
                    value / total * 100.0
                )
            } else {
                format!("{name} {}", fmt_num(value))
            }
        })
        .collect();
    format!(
        "Top channels by {lead_metric} between {} and {}: {}.",
        descriptor.primary_range().start,
        descriptor.primary_range().end,
        listed.join(", ")
    )
}

fn trend_text(descriptor: &QueryDescriptor, result: &ExecutionResult) -> String {
    let lead_metric = &descriptor.metrics[0];
    let mut series: Vec<(&str, f64)> = result
        .rows
        .iter()
        .filter(|row| !row.dimension_values.is_empty())
        .map(|row| (row.dimension_values[0].as_str(), metric_value(row, 0)))
        .collect();
    // Bucket labels are YYYYMMDD, so lexicographic order is chronological.
    series.sort_by(|a, b| a.0.cmp(b.0));

    if series.len() < 2 {
        return basic_metric_text(descriptor, result);
    }

    let (first_label, first) = series[0];
    let (last_label, last) = series[series.len() - 1];
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let movement = match pct_change(last, first) {
        Some(delta) if delta > 5.0 => format!("trending upward ({})", fmt_pct(delta)),
        Some(delta) if delta < -5.0 => format!("trending downward ({})", fmt_pct(delta)),
        Some(delta) => format!("roughly flat ({})", fmt_pct(delta)),
        None => "starting from zero".to_string(),
    };

    format!(
        "{lead_metric} moved from {} on {first_label} to {} on {last_label}, {movement}; it averaged {} per bucket (min {}, max {}).",
        fmt_num(first),
        fmt_num(last),
        fmt_num(mean),
        fmt_num(min),
        fmt_num(max)
    )
}

fn comparison_text(descriptor: &QueryDescriptor, result: &ExecutionResult) -> String {
    let (current, previous) = split_by_range(&result.rows);

    let Some(comparison) = descriptor.comparison_range() else {
        return basic_metric_text(descriptor, result);
    };
    if previous.is_empty() {
        return format!(
            "{} No rows were returned for the comparison window {}.",
            basic_metric_text(descriptor, result),
            comparison
        );
    }

    let parts: Vec<String> = descriptor
        .metrics
        .iter()
        .take(2)
        .enumerate()
        .map(|(idx, metric)| {
            let now = aggregate_metric(&current, idx, metric);
            let then = aggregate_metric(&previous, idx, metric);
            match pct_change(now, then) {
                Some(delta) => format!(
                    "{metric} changed {} ({} vs {})",
                    fmt_pct(delta),
                    fmt_num(now),
                    fmt_num(then)
                ),
                None => format!("{metric} came to {} (previously zero)", fmt_num(now)),
            }
        })
        .collect();

    format!(
        "Between {} and {} compared with {}: {}.",
        descriptor.primary_range().start,
        descriptor.primary_range().end,
        comparison,
        parts.join(", ")
    )
}

/// Rows split by the implicit range tag backends emit for two-window
/// requests. Untagged rows all count toward the primary window.
fn split_by_range(rows: &[ReportRow]) -> (Vec<&ReportRow>, Vec<&ReportRow>) {
    let tagged = rows
        .iter()
        .all(|row| matches!(row.dimension_values.first().map(String::as_str), Some(v) if v.starts_with("date_range_")));
    if !tagged {
        return (rows.iter().collect(), Vec::new());
    }
    let current = rows
        .iter()
        .filter(|row| row.dimension_values[0] == "date_range_0")
        .collect();
    let previous = rows
        .iter()
        .filter(|row| row.dimension_values[0] == "date_range_1")
        .collect();
    (current, previous)
}

/// Rank by lead metric descending, ties by the second metric descending,
/// then by dimension value ascending.
fn ranked_rows(rows: &[ReportRow]) -> Vec<&ReportRow> {
    let mut ranked: Vec<&ReportRow> = rows.iter().collect();
    ranked.sort_by(|a, b| {
        metric_value(b, 0)
            .total_cmp(&metric_value(a, 0))
            .then_with(|| metric_value(b, 1).total_cmp(&metric_value(a, 1)))
            .then_with(|| a.dimension_values.first().cmp(&b.dimension_values.first()))
    });
    ranked
}

fn metric_value(row: &ReportRow, index: usize) -> f64 {
    row.metric_values
        .get(index)
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Counts and revenue sum across rows; rates and per-X metrics average.
fn aggregate_metric(rows: &[&ReportRow], index: usize, metric: &str) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let sum: f64 = rows.iter().map(|row| metric_value(row, index)).sum();
    if is_ratio_metric(metric) {
        sum / rows.len() as f64
    } else {
        sum
    }
}

fn is_ratio_metric(metric: &str) -> bool {
    metric.contains("Rate") || metric.contains("Per") || metric.starts_with("average")
}

fn pct_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

fn fmt_num(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn fmt_pct(delta: f64) -> String {
    format!("{delta:+.1}%")
}
