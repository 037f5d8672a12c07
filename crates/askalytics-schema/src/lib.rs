use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single natural-language question as received from the caller.
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub trace_id: Uuid,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Caller-supplied defaults for one request: the "now" reference used to
/// resolve relative date phrases, the target property, and fallbacks for
/// slots the question leaves open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    pub now: NaiveDate,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default = "default_range_days")]
    pub default_range_days: i64,
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u32,
}

fn default_range_days() -> i64 {
    30
}

fn default_row_limit() -> u32 {
    10
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            now: Utc::now().date_naive(),
            property_id: None,
            default_range_days: default_range_days(),
            default_row_limit: default_row_limit(),
        }
    }
}

/// The fixed analytical intent taxonomy. Closed on purpose: the compiler
/// and synthesizer match exhaustively, so a new variant fails to compile
/// everywhere it must be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    BasicMetric,
    PageAnalysis,
    TrafficSource,
    UserBehavior,
    Conversion,
    Trend,
    Comparison,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 7] = [
        QueryIntent::BasicMetric,
        QueryIntent::PageAnalysis,
        QueryIntent::TrafficSource,
        QueryIntent::UserBehavior,
        QueryIntent::Conversion,
        QueryIntent::Trend,
        QueryIntent::Comparison,
    ];

    /// Tie-break rank. Higher wins when two intents score equally.
    pub fn specificity(&self) -> u8 {
        match self {
            QueryIntent::BasicMetric => 0,
            QueryIntent::PageAnalysis => 1,
            QueryIntent::TrafficSource => 2,
            QueryIntent::UserBehavior => 3,
            QueryIntent::Conversion => 4,
            QueryIntent::Trend => 5,
            QueryIntent::Comparison => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::BasicMetric => "basic_metric",
            QueryIntent::PageAnalysis => "page_analysis",
            QueryIntent::TrafficSource => "traffic_source",
            QueryIntent::UserBehavior => "user_behavior",
            QueryIntent::Conversion => "conversion",
            QueryIntent::Trend => "trend",
            QueryIntent::Comparison => "comparison",
        }
    }

    /// Metrics requested when the question names none.
    pub fn canonical_metrics(&self) -> &'static [&'static str] {
        match self {
            QueryIntent::BasicMetric => {
                &["totalUsers", "sessions", "screenPageViews", "conversions"]
            }
            QueryIntent::PageAnalysis => &["screenPageViews", "totalUsers", "bounceRate"],
            QueryIntent::TrafficSource => &["sessions", "totalUsers", "conversions"],
            QueryIntent::UserBehavior => &[
                "averageSessionDuration",
                "sessionsPerUser",
                "screenPageViewsPerSession",
            ],
            QueryIntent::Conversion => &["conversions", "sessionConversionRate", "totalRevenue"],
            QueryIntent::Trend => &["totalUsers", "sessions"],
            QueryIntent::Comparison => &["totalUsers", "sessions"],
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output: the winning intent with a normalized score in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: QueryIntent,
    pub confidence: f64,
}

impl IntentResult {
    pub fn new(intent: QueryIntent, confidence: f64) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Inclusive date range. Producers uphold start <= end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The `days`-day window ending at `end` inclusive.
    pub fn ending_at(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - chrono::Duration::days(days.max(1) - 1),
            end,
        }
    }

    /// Number of days covered, inclusive of both endpoints.
    pub fn span_days(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_days() + 1
    }

    /// The window of equal length immediately before this one.
    pub fn preceding(&self) -> DateRange {
        let span = self.span_days();
        DateRange {
            start: self.start - chrono::Duration::days(span),
            end: self.start - chrono::Duration::days(1),
        }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whole calendar month containing `date`, truncated at `date` when the
    /// month is still running.
    pub fn month_to(date: NaiveDate) -> Self {
        let first = date.with_day(1).expect("day 1 always valid");
        Self {
            start: first,
            end: date,
        }
    }

    /// The full calendar month before the one containing `date`.
    pub fn previous_month(date: NaiveDate) -> Self {
        let first_this = date.with_day(1).expect("day 1 always valid");
        let end = first_this - chrono::Duration::days(1);
        let start = end.with_day(1).expect("day 1 always valid");
        Self { start, end }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Equality predicate on a dimension, the only filter shape the provider
/// contract requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub dimension: String,
    pub value: String,
}

/// Time-bucket width for trend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
}

impl Granularity {
    pub fn time_dimension(&self) -> &'static str {
        match self {
            Granularity::Daily => "date",
            Granularity::Weekly => "week",
        }
    }
}

/// Slots recognized in the question text. Metric and dimension names are
/// already canonical (vocabulary resolution happens in the extractor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub date_range: DateRange,
    /// Ordered, deduplicated canonical metric names.
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
    #[serde(default)]
    pub comparison_range: Option<DateRange>,
    #[serde(default)]
    pub row_limit: Option<u32>,
    #[serde(default)]
    pub granularity: Option<Granularity>,
}

impl ParameterSet {
    pub fn with_range(date_range: DateRange) -> Self {
        Self {
            date_range,
            metrics: Vec::new(),
            dimensions: Vec::new(),
            filters: Vec::new(),
            comparison_range: None,
            row_limit: None,
            granularity: None,
        }
    }
}

/// Which slot a cost-bound clamp touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampSlot {
    RowLimit,
    DateSpan,
}

/// Record of a silent reduction applied by the compiler to stay within
/// cost bounds. Carried on the descriptor, surfaced as lowered confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampNotice {
    pub slot: ClampSlot,
    pub requested: u64,
    pub applied: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub metric: String,
    pub descending: bool,
}

/// Canonical, validated, execution-ready query. Every descriptor the
/// compiler yields can be executed by the router without further checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub intent: QueryIntent,
    #[serde(default)]
    pub property_id: Option<String>,
    /// One range, or [primary, comparison] for comparison queries.
    pub date_ranges: Vec<DateRange>,
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    pub limit: u32,
    #[serde(default)]
    pub clamps: Vec<ClampNotice>,
}

impl QueryDescriptor {
    pub fn primary_range(&self) -> &DateRange {
        &self.date_ranges[0]
    }

    pub fn comparison_range(&self) -> Option<&DateRange> {
        self.date_ranges.get(1)
    }

    pub fn was_clamped(&self) -> bool {
        !self.clamps.is_empty()
    }
}

/// Identifier of the data source that served a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    Ga4Api,
    Warehouse,
    Simulated,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Ga4Api => "ga4_api",
            BackendId::Warehouse => "warehouse",
            BackendId::Simulated => "simulated",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result row in the provider's wire shape. Metric values arrive as
/// strings, exactly as GA4 reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub dimension_values: Vec<String>,
    pub metric_values: Vec<String>,
}

/// Raw outcome of a successful execution. Ephemeral: ownership passes to
/// the synthesizer and the value is dropped with the request.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub rows: Vec<ReportRow>,
    pub row_count: usize,
    pub latency: Duration,
    pub backend: BackendId,
}

impl ExecutionResult {
    pub fn new(rows: Vec<ReportRow>, latency: Duration, backend: BackendId) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            latency,
            backend,
        }
    }
}

/// The caller-facing answer. Serialized form is the output boundary:
/// `{response, confidence, query_type, execution_time, data, suggestions}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseObject {
    pub response: String,
    pub confidence: f64,
    pub query_type: QueryIntent,
    /// Seconds spent executing the query.
    pub execution_time: f64,
    #[serde(default)]
    pub data: Vec<ReportRow>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ResponseObject {
    /// Structured failure payload. The caller never receives a bare error:
    /// confidence is zero, the text names the failure category, and data
    /// and suggestions are empty.
    pub fn failure(query_type: QueryIntent, message: impl Into<String>) -> Self {
        Self {
            response: message.into(),
            confidence: 0.0,
            query_type,
            execution_time: 0.0,
            data: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_span_is_inclusive() {
        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 1));
        assert_eq!(range.span_days(), 1);

        let range = DateRange::new(date(2024, 12, 25), date(2025, 1, 24));
        assert_eq!(range.span_days(), 31);
    }

    #[test]
    fn ending_at_counts_back_inclusively() {
        let range = DateRange::ending_at(date(2025, 1, 24), 31);
        assert_eq!(range.start, date(2024, 12, 25));
        assert_eq!(range.end, date(2025, 1, 24));
    }

    #[test]
    fn preceding_window_is_adjacent_and_equal_length() {
        let range = DateRange::new(date(2025, 1, 8), date(2025, 1, 14));
        let prev = range.preceding();
        assert_eq!(prev.start, date(2025, 1, 1));
        assert_eq!(prev.end, date(2025, 1, 7));
        assert_eq!(prev.span_days(), range.span_days());
        assert!(!prev.overlaps(&range));
    }

    #[test]
    fn previous_month_handles_year_boundary() {
        let prev = DateRange::previous_month(date(2025, 1, 24));
        assert_eq!(prev.start, date(2024, 12, 1));
        assert_eq!(prev.end, date(2024, 12, 31));
    }

    #[test]
    fn month_to_truncates_at_reference_day() {
        let range = DateRange::month_to(date(2025, 1, 24));
        assert_eq!(range.start, date(2025, 1, 1));
        assert_eq!(range.end, date(2025, 1, 24));
    }

    #[test]
    fn overlap_detection() {
        let a = DateRange::new(date(2025, 1, 1), date(2025, 1, 10));
        let b = DateRange::new(date(2025, 1, 10), date(2025, 1, 20));
        let c = DateRange::new(date(2025, 1, 11), date(2025, 1, 20));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn intent_wire_tags_are_stable() {
        for intent in QueryIntent::ALL {
            let json = serde_json::to_string(&intent).unwrap();
            assert_eq!(json, format!("\"{}\"", intent.as_str()));
            let back: QueryIntent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, intent);
        }
    }

    #[test]
    fn intent_specificity_is_strictly_ordered() {
        let ranks: Vec<u8> = QueryIntent::ALL.iter().map(|i| i.specificity()).collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 7);
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn every_intent_has_canonical_metrics() {
        for intent in QueryIntent::ALL {
            assert!(!intent.canonical_metrics().is_empty());
        }
    }

    #[test]
    fn intent_result_clamps_confidence() {
        assert_eq!(IntentResult::new(QueryIntent::Trend, 1.7).confidence, 1.0);
        assert_eq!(
            IntentResult::new(QueryIntent::Trend, -0.2).confidence,
            0.0
        );
    }

    #[test]
    fn failure_response_shape() {
        let resp = ResponseObject::failure(QueryIntent::Comparison, "no comparison window");
        assert_eq!(resp.confidence, 0.0);
        assert!(resp.data.is_empty());
        assert!(resp.suggestions.is_empty());

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["query_type"], "comparison");
        assert_eq!(json["confidence"], 0.0);
        assert_eq!(json["response"], "no comparison window");
    }

    #[test]
    fn response_object_serde_roundtrip() {
        let resp = ResponseObject {
            response: "1250 users".into(),
            confidence: 0.82,
            query_type: QueryIntent::BasicMetric,
            execution_time: 0.031,
            data: vec![ReportRow {
                dimension_values: vec![],
                metric_values: vec!["1250".into()],
            }],
            suggestions: vec!["Break this down by channel".into()],
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ResponseObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn descriptor_range_accessors() {
        let primary = DateRange::new(date(2025, 1, 1), date(2025, 1, 24));
        let comparison = DateRange::new(date(2024, 12, 1), date(2024, 12, 31));
        let descriptor = QueryDescriptor {
            intent: QueryIntent::Comparison,
            property_id: None,
            date_ranges: vec![primary, comparison],
            metrics: vec!["totalUsers".into()],
            dimensions: vec![],
            filters: vec![],
            order_by: None,
            limit: 10,
            clamps: vec![],
        };
        assert_eq!(*descriptor.primary_range(), primary);
        assert_eq!(descriptor.comparison_range(), Some(&comparison));
        assert!(!descriptor.was_clamped());
    }
}
