use askalytics_schema::DimensionFilter;

use crate::matching::match_positions;

/// One entry of the controlled synonym tables. The tables are static,
/// versioned lookup data; matching logic stays stable as vocabulary grows.
#[derive(Debug, Clone, Copy)]
pub struct Synonym {
    pub term: &'static str,
    pub canonical: &'static str,
}

/// Mention of a metric in question text, mapped to its canonical GA4 name.
/// Terms are lowercase; lookup happens against lowercased input.
pub const METRIC_SYNONYMS: &[Synonym] = &[
    Synonym { term: "訪客", canonical: "activeUsers" },
    Synonym { term: "活躍用戶", canonical: "activeUsers" },
    Synonym { term: "visitors", canonical: "activeUsers" },
    Synonym { term: "active users", canonical: "activeUsers" },
    Synonym { term: "新用戶", canonical: "newUsers" },
    Synonym { term: "new users", canonical: "newUsers" },
    Synonym { term: "用戶", canonical: "totalUsers" },
    Synonym { term: "users", canonical: "totalUsers" },
    Synonym { term: "會話", canonical: "sessions" },
    Synonym { term: "工作階段", canonical: "sessions" },
    Synonym { term: "sessions", canonical: "sessions" },
    Synonym { term: "流量", canonical: "sessions" },
    Synonym { term: "traffic", canonical: "sessions" },
    Synonym { term: "瀏覽量", canonical: "screenPageViews" },
    Synonym { term: "頁面瀏覽", canonical: "screenPageViews" },
    Synonym { term: "pageviews", canonical: "screenPageViews" },
    Synonym { term: "page views", canonical: "screenPageViews" },
    Synonym { term: "轉換率", canonical: "sessionConversionRate" },
    Synonym { term: "conversion rate", canonical: "sessionConversionRate" },
    Synonym { term: "轉換", canonical: "conversions" },
    Synonym { term: "conversions", canonical: "conversions" },
    Synonym { term: "收入", canonical: "totalRevenue" },
    Synonym { term: "營收", canonical: "totalRevenue" },
    Synonym { term: "revenue", canonical: "totalRevenue" },
    Synonym { term: "跳出率", canonical: "bounceRate" },
    Synonym { term: "bounce rate", canonical: "bounceRate" },
    Synonym { term: "停留時間", canonical: "averageSessionDuration" },
    Synonym { term: "session duration", canonical: "averageSessionDuration" },
    Synonym { term: "time on site", canonical: "averageSessionDuration" },
    Synonym { term: "互動會話", canonical: "engagedSessions" },
    Synonym { term: "engaged sessions", canonical: "engagedSessions" },
];

pub const DIMENSION_SYNONYMS: &[Synonym] = &[
    Synonym { term: "頁面", canonical: "pagePath" },
    Synonym { term: "網頁", canonical: "pagePath" },
    Synonym { term: "pages", canonical: "pagePath" },
    Synonym { term: "page", canonical: "pagePath" },
    Synonym { term: "來源", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "渠道", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "管道", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "sources", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "source", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "channels", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "channel", canonical: "sessionDefaultChannelGrouping" },
    Synonym { term: "裝置", canonical: "deviceCategory" },
    Synonym { term: "設備", canonical: "deviceCategory" },
    Synonym { term: "devices", canonical: "deviceCategory" },
    Synonym { term: "device", canonical: "deviceCategory" },
    Synonym { term: "國家", canonical: "country" },
    Synonym { term: "countries", canonical: "country" },
    Synonym { term: "country", canonical: "country" },
    Synonym { term: "每天", canonical: "date" },
    Synonym { term: "每日", canonical: "date" },
    Synonym { term: "by day", canonical: "date" },
    Synonym { term: "daily", canonical: "date" },
];

/// Fixed filter vocabulary: a mention pins `dimension = value`.
#[derive(Debug, Clone, Copy)]
pub struct FilterSynonym {
    pub term: &'static str,
    pub dimension: &'static str,
    pub value: &'static str,
}

pub const FILTER_SYNONYMS: &[FilterSynonym] = &[
    FilterSynonym { term: "desktop", dimension: "deviceCategory", value: "desktop" },
    FilterSynonym { term: "桌機", dimension: "deviceCategory", value: "desktop" },
    FilterSynonym { term: "mobile", dimension: "deviceCategory", value: "mobile" },
    FilterSynonym { term: "手機", dimension: "deviceCategory", value: "mobile" },
    FilterSynonym { term: "tablet", dimension: "deviceCategory", value: "tablet" },
    FilterSynonym { term: "平板", dimension: "deviceCategory", value: "tablet" },
    FilterSynonym {
        term: "organic search",
        dimension: "sessionDefaultChannelGrouping",
        value: "Organic Search",
    },
    FilterSynonym {
        term: "自然搜尋",
        dimension: "sessionDefaultChannelGrouping",
        value: "Organic Search",
    },
    FilterSynonym {
        term: "paid search",
        dimension: "sessionDefaultChannelGrouping",
        value: "Paid Search",
    },
    FilterSynonym {
        term: "社群",
        dimension: "sessionDefaultChannelGrouping",
        value: "Social",
    },
    FilterSynonym {
        term: "social media",
        dimension: "sessionDefaultChannelGrouping",
        value: "Social",
    },
];

/// Related-dimension pairs used for follow-up suggestions.
const RELATED_DIMENSIONS: &[(&str, &str)] = &[
    ("pagePath", "deviceCategory"),
    ("sessionDefaultChannelGrouping", "sessionSourceMedium"),
    ("deviceCategory", "country"),
    ("country", "deviceCategory"),
    ("date", "sessionDefaultChannelGrouping"),
    ("week", "sessionDefaultChannelGrouping"),
];

pub fn related_dimension(dimension: &str) -> Option<&'static str> {
    RELATED_DIMENSIONS
        .iter()
        .find(|(d, _)| *d == dimension)
        .map(|(_, related)| *related)
}

/// Canonical metric names mentioned in `text`, ordered by first appearance
/// and deduplicated. Unrecognized mentions simply do not appear.
pub fn metrics_in(text: &str) -> Vec<String> {
    resolve(text, METRIC_SYNONYMS)
}

pub fn dimensions_in(text: &str) -> Vec<String> {
    resolve(text, DIMENSION_SYNONYMS)
}

pub fn filters_in(text: &str) -> Vec<DimensionFilter> {
    let terms: Vec<&str> = FILTER_SYNONYMS.iter().map(|s| s.term).collect();
    let positions = match_positions(text, &terms);

    let mut hits: Vec<(usize, &FilterSynonym)> = positions
        .into_iter()
        .zip(FILTER_SYNONYMS.iter())
        .filter_map(|(pos, syn)| pos.map(|p| (p, syn)))
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);

    let mut out: Vec<DimensionFilter> = Vec::new();
    for (_, syn) in hits {
        let filter = DimensionFilter {
            dimension: syn.dimension.to_string(),
            value: syn.value.to_string(),
        };
        if !out.iter().any(|f| f.dimension == filter.dimension) {
            out.push(filter);
        }
    }
    out
}

fn resolve(text: &str, table: &[Synonym]) -> Vec<String> {
    let terms: Vec<&str> = table.iter().map(|s| s.term).collect();
    let positions = match_positions(text, &terms);

    let mut hits: Vec<(usize, &str)> = positions
        .into_iter()
        .zip(table.iter())
        .filter_map(|(pos, syn)| pos.map(|p| (p, syn.canonical)))
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);

    let mut out: Vec<String> = Vec::new();
    for (_, canonical) in hits {
        if !out.iter().any(|m| m == canonical) {
            out.push(canonical.to_string());
        }
    }
    out
}
