use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use askalytics_schema::{DateRange, Granularity, ParameterSet, QueryContext, Utterance};

use crate::vocabulary;

const COMPARISON_CUES: &[&str] = &[
    "相比",
    "對比",
    "比較",
    "比起",
    "compared to",
    "compared with",
    "compare",
    "versus",
    "vs",
];

/// Total function: pulls every recognizable slot out of the question.
/// Relative dates resolve against `ctx.now` only, so the output depends
/// solely on (text, context), never on wall-clock time. Unrecognized
/// mentions are dropped; missing dates fall back to the context default.
pub fn extract(utterance: &Utterance, ctx: &QueryContext) -> ParameterSet {
    let text = utterance.text.to_lowercase();
    let now = ctx.now;

    let relative = relative_window(&text, now);
    let named = named_past(&text, now);
    let current = current_window(&text, now);
    let default_range = days_ago_window(now, ctx.default_range_days.max(1));

    let has_cue = COMPARISON_CUES.iter().any(|cue| text.contains(cue));

    let (date_range, comparison_range) = if has_cue {
        match (&relative, &named) {
            // "past 30 days vs last month": explicit primary, named target.
            (Some(range), Some(past)) => (*range, Some(past.past)),
            // "vs last month": the named window is the comparison target
            // and the running counterpart becomes the primary.
            (None, Some(past)) => (past.current, Some(past.past)),
            (Some(range), None) => (*range, Some(range.preceding())),
            (None, None) => {
                let primary = current.unwrap_or(default_range);
                (primary, Some(primary.preceding()))
            }
        }
    } else {
        let primary = relative
            .or(named.map(|n| n.past))
            .or(current)
            .unwrap_or(default_range);
        (primary, None)
    };

    // A comparison window overlapping the primary cannot be executed;
    // fall back to the immediately preceding period.
    let comparison_range = comparison_range.map(|range| {
        if range.overlaps(&date_range) {
            date_range.preceding()
        } else {
            range
        }
    });

    ParameterSet {
        date_range,
        metrics: vocabulary::metrics_in(&text),
        dimensions: vocabulary::dimensions_in(&text),
        filters: vocabulary::filters_in(&text),
        comparison_range,
        row_limit: row_limit(&text),
        granularity: granularity(&text),
    }
}

/// `[now - days, now]`, the same window GA4 means by "NdaysAgo..today".
fn days_ago_window(now: NaiveDate, days: i64) -> DateRange {
    DateRange {
        start: now - chrono::Duration::days(days),
        end: now,
    }
}

#[derive(Debug, Clone, Copy)]
struct NamedPast {
    past: DateRange,
    /// The running counterpart, used as primary for "vs <past>" phrasing.
    current: DateRange,
}

fn relative_window(text: &str, now: NaiveDate) -> Option<DateRange> {
    let days = relative_days(text)?;
    Some(days_ago_window(now, days))
}

fn relative_days(text: &str) -> Option<i64> {
    static EN_DAYS: OnceLock<Regex> = OnceLock::new();
    static EN_WEEKS: OnceLock<Regex> = OnceLock::new();
    static EN_MONTHS: OnceLock<Regex> = OnceLock::new();
    static ZH_DAYS: OnceLock<Regex> = OnceLock::new();
    static ZH_DAYS_NUMERAL: OnceLock<Regex> = OnceLock::new();
    static ZH_WEEKS: OnceLock<Regex> = OnceLock::new();
    static ZH_MONTHS: OnceLock<Regex> = OnceLock::new();

    let en_days = EN_DAYS.get_or_init(|| Regex::new(r"(?:past|last|previous)\s+(\d+)\s+days?").unwrap());
    let en_weeks =
        EN_WEEKS.get_or_init(|| Regex::new(r"(?:past|last|previous)\s+(\d+)\s+weeks?").unwrap());
    let en_months =
        EN_MONTHS.get_or_init(|| Regex::new(r"(?:past|last|previous)\s+(\d+)\s+months?").unwrap());
    let zh_days = ZH_DAYS.get_or_init(|| Regex::new(r"(?:過去|最近|近)\s*(\d+)\s*天").unwrap());
    let zh_days_numeral = ZH_DAYS_NUMERAL
        .get_or_init(|| Regex::new(r"(?:過去|最近|近)([一二三四五六七八九十]+)天").unwrap());
    let zh_weeks =
        ZH_WEEKS.get_or_init(|| Regex::new(r"(?:過去|最近|近)\s*(\d+)\s*(?:週|周)").unwrap());
    let zh_months =
        ZH_MONTHS.get_or_init(|| Regex::new(r"(?:過去|最近|近)\s*(\d+)\s*個月").unwrap());

    if let Some(n) = capture_number(zh_months, text).or_else(|| capture_number(en_months, text)) {
        return Some(n * 30);
    }
    if let Some(n) = capture_number(zh_weeks, text).or_else(|| capture_number(en_weeks, text)) {
        return Some(n * 7);
    }
    if let Some(n) = capture_number(zh_days, text).or_else(|| capture_number(en_days, text)) {
        return Some(n);
    }
    if let Some(caps) = zh_days_numeral.captures(text) {
        if let Some(n) = chinese_numeral(&caps[1]) {
            return Some(n);
        }
    }
    None
}

fn capture_number(regex: &Regex, text: &str) -> Option<i64> {
    regex
        .captures(text)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .filter(|n| *n > 0)
}

fn named_past(text: &str, now: NaiveDate) -> Option<NamedPast> {
    let monday = now - chrono::Duration::days(i64::from(now.weekday().num_days_from_monday()));

    if text.contains("上個月") || text.contains("上月") || text.contains("last month") {
        return Some(NamedPast {
            past: DateRange::previous_month(now),
            current: DateRange::month_to(now),
        });
    }
    if text.contains("上週") || text.contains("上周") || text.contains("last week") {
        return Some(NamedPast {
            past: DateRange::new(
                monday - chrono::Duration::days(7),
                monday - chrono::Duration::days(1),
            ),
            current: DateRange::new(monday, now),
        });
    }
    if text.contains("去年") || text.contains("last year") {
        let year = now.year();
        return Some(NamedPast {
            past: DateRange::new(
                NaiveDate::from_ymd_opt(year - 1, 1, 1).expect("jan 1 valid"),
                NaiveDate::from_ymd_opt(year - 1, 12, 31).expect("dec 31 valid"),
            ),
            current: DateRange::new(
                NaiveDate::from_ymd_opt(year, 1, 1).expect("jan 1 valid"),
                now,
            ),
        });
    }
    if text.contains("昨天") || text.contains("yesterday") {
        return Some(NamedPast {
            past: DateRange::day(now - chrono::Duration::days(1)),
            current: DateRange::day(now),
        });
    }
    None
}

fn current_window(text: &str, now: NaiveDate) -> Option<DateRange> {
    let monday = now - chrono::Duration::days(i64::from(now.weekday().num_days_from_monday()));

    if text.contains("今天") || text.contains("today") {
        return Some(DateRange::day(now));
    }
    if text.contains("本週") || text.contains("這週") || text.contains("this week") {
        return Some(DateRange::new(monday, now));
    }
    if text.contains("本月") || text.contains("這個月") || text.contains("this month") {
        return Some(DateRange::month_to(now));
    }
    if text.contains("今年") || text.contains("this year") {
        return Some(DateRange::new(
            NaiveDate::from_ymd_opt(now.year(), 1, 1).expect("jan 1 valid"),
            now,
        ));
    }
    None
}

fn row_limit(text: &str) -> Option<u32> {
    static EN_TOP: OnceLock<Regex> = OnceLock::new();
    static ZH_TOP: OnceLock<Regex> = OnceLock::new();
    static ZH_TOP_NUMERAL: OnceLock<Regex> = OnceLock::new();

    let en_top = EN_TOP.get_or_init(|| Regex::new(r"top\s*(\d+)").unwrap());
    let zh_top = ZH_TOP.get_or_init(|| Regex::new(r"前\s*(\d+)\s*名?").unwrap());
    let zh_top_numeral =
        ZH_TOP_NUMERAL.get_or_init(|| Regex::new(r"前([一二三四五六七八九十]+)名?").unwrap());

    if let Some(n) = capture_number(en_top, text).or_else(|| capture_number(zh_top, text)) {
        return u32::try_from(n).ok();
    }
    if let Some(caps) = zh_top_numeral.captures(text) {
        if let Some(n) = chinese_numeral(&caps[1]) {
            return u32::try_from(n).ok();
        }
    }
    None
}

fn granularity(text: &str) -> Option<Granularity> {
    const WEEKLY: &[&str] = &["每週", "每周", "weekly", "by week", "week over week"];
    const DAILY: &[&str] = &["每天", "每日", "daily", "by day", "day by day"];

    if WEEKLY.iter().any(|t| text.contains(t)) {
        return Some(Granularity::Weekly);
    }
    if DAILY.iter().any(|t| text.contains(t)) {
        return Some(Granularity::Daily);
    }
    None
}

/// Small Chinese numeral reader, enough for the 1..=99 counts that show
/// up in date and top-N phrases.
fn chinese_numeral(s: &str) -> Option<i64> {
    fn digit(c: char) -> Option<i64> {
        match c {
            '一' => Some(1),
            '二' => Some(2),
            '三' => Some(3),
            '四' => Some(4),
            '五' => Some(5),
            '六' => Some(6),
            '七' => Some(7),
            '八' => Some(8),
            '九' => Some(9),
            _ => None,
        }
    }

    let chars: Vec<char> = s.chars().collect();
    match chars.iter().position(|&c| c == '十') {
        Some(pos) => {
            let tens = match pos {
                0 => 1,
                1 => digit(chars[0])?,
                _ => return None,
            };
            let ones = match chars.len() - pos {
                1 => 0,
                2 => digit(chars[pos + 1])?,
                _ => return None,
            };
            Some(tens * 10 + ones)
        }
        None => match chars.as_slice() {
            [c] => digit(*c),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(now: NaiveDate) -> QueryContext {
        QueryContext {
            now,
            property_id: None,
            default_range_days: 30,
            default_row_limit: 10,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn extract_text(text: &str, now: NaiveDate) -> ParameterSet {
        extract(&Utterance::new(text), &ctx(now))
    }

    #[test]
    fn past_30_days_in_chinese_resolves_against_now() {
        let params = extract_text("過去30天有多少訪客？", date(2025, 1, 24));
        assert_eq!(params.date_range.start, date(2024, 12, 25));
        assert_eq!(params.date_range.end, date(2025, 1, 24));
        assert_eq!(params.metrics, vec!["activeUsers"]);
        assert!(params.comparison_range.is_none());
    }

    #[test]
    fn extraction_is_deterministic_given_now() {
        let now = date(2025, 1, 24);
        let a = extract_text("past 7 days traffic by channel", now);
        let b = extract_text("past 7 days traffic by channel", now);
        assert_eq!(a, b);
    }

    #[test]
    fn english_relative_days() {
        let params = extract_text("how many users in the last 7 days", date(2025, 1, 24));
        assert_eq!(params.date_range.start, date(2025, 1, 17));
        assert_eq!(params.date_range.end, date(2025, 1, 24));
    }

    #[test]
    fn chinese_numeral_days() {
        let params = extract_text("最近七天的流量", date(2025, 1, 24));
        assert_eq!(params.date_range.start, date(2025, 1, 17));
    }

    #[test]
    fn relative_months_scale_to_days() {
        let params = extract_text("past 3 months of sessions", date(2025, 1, 24));
        assert_eq!(params.date_range.span_days(), 91);
    }

    #[test]
    fn absent_dates_fall_back_to_default_range() {
        let params = extract_text("有多少訪客", date(2025, 1, 24));
        assert_eq!(params.date_range.start, date(2024, 12, 25));
        assert_eq!(params.date_range.end, date(2025, 1, 24));
    }

    #[test]
    fn vs_last_month_builds_disjoint_windows() {
        let params = extract_text("與上個月相比如何？", date(2025, 1, 24));
        let primary = params.date_range;
        let comparison = params.comparison_range.expect("comparison window");
        assert_eq!(primary, DateRange::new(date(2025, 1, 1), date(2025, 1, 24)));
        assert_eq!(
            comparison,
            DateRange::new(date(2024, 12, 1), date(2024, 12, 31))
        );
        assert!(!primary.overlaps(&comparison));
    }

    #[test]
    fn comparison_cue_without_window_uses_preceding_period() {
        let params = extract_text("compare the last 14 days", date(2025, 1, 24));
        let primary = params.date_range;
        let comparison = params.comparison_range.expect("comparison window");
        assert_eq!(comparison, primary.preceding());
        assert!(!primary.overlaps(&comparison));
    }

    #[test]
    fn comparison_detected_even_for_non_comparison_wording() {
        // Intent reconciliation is the compiler's job; the extractor
        // reports the window regardless.
        let params = extract_text("趨勢與上週相比", date(2025, 1, 24));
        assert!(params.comparison_range.is_some());
    }

    #[test]
    fn last_month_without_cue_is_the_primary_window() {
        let params = extract_text("上個月的流量", date(2025, 1, 24));
        assert_eq!(
            params.date_range,
            DateRange::new(date(2024, 12, 1), date(2024, 12, 31))
        );
        assert!(params.comparison_range.is_none());
    }

    #[test]
    fn yesterday_vs_today() {
        let params = extract_text("today vs yesterday", date(2025, 1, 24));
        assert_eq!(params.date_range, DateRange::day(date(2025, 1, 24)));
        assert_eq!(
            params.comparison_range,
            Some(DateRange::day(date(2025, 1, 23)))
        );
    }

    #[test]
    fn this_week_starts_monday() {
        // 2025-01-24 is a Friday.
        let params = extract_text("this week sessions", date(2025, 1, 24));
        assert_eq!(params.date_range.start, date(2025, 1, 20));
        assert_eq!(params.date_range.end, date(2025, 1, 24));
    }

    #[test]
    fn top_n_sets_row_limit() {
        assert_eq!(
            extract_text("top 5 pages", date(2025, 1, 24)).row_limit,
            Some(5)
        );
        assert_eq!(
            extract_text("前十名頁面", date(2025, 1, 24)).row_limit,
            Some(10)
        );
    }

    #[test]
    fn granularity_words_are_recognized() {
        assert_eq!(
            extract_text("每週趨勢", date(2025, 1, 24)).granularity,
            Some(Granularity::Weekly)
        );
        assert_eq!(
            extract_text("daily trend of users", date(2025, 1, 24)).granularity,
            Some(Granularity::Daily)
        );
    }

    #[test]
    fn filters_and_dimensions_resolve_through_vocabulary() {
        let params = extract_text("mobile traffic by channel", date(2025, 1, 24));
        assert_eq!(params.dimensions, vec!["sessionDefaultChannelGrouping"]);
        assert_eq!(params.filters.len(), 1);
        assert_eq!(params.filters[0].dimension, "deviceCategory");
    }

    #[test]
    fn chinese_numerals_parse() {
        assert_eq!(chinese_numeral("七"), Some(7));
        assert_eq!(chinese_numeral("十"), Some(10));
        assert_eq!(chinese_numeral("十五"), Some(15));
        assert_eq!(chinese_numeral("三十"), Some(30));
        assert_eq!(chinese_numeral("三十五"), Some(35));
        assert_eq!(chinese_numeral("廿"), None);
    }
}
