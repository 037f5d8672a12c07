use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use askalytics_schema::{BackendId, DateRange, ReportRow};

use crate::{AnalyticsBackend, BackendError, ReportRequest};

const CHANNEL_GROUPS: [&str; 6] = [
    "Organic Search",
    "Direct",
    "Paid Search",
    "Social",
    "Referral",
    "Email",
];

const PAGE_PATHS: [&str; 8] = [
    "/",
    "/products",
    "/pricing",
    "/blog",
    "/about",
    "/contact",
    "/docs",
    "/signup",
];

const DEVICE_CATEGORIES: [&str; 3] = ["desktop", "mobile", "tablet"];

const COUNTRIES: [&str; 6] = [
    "United States",
    "Taiwan",
    "Japan",
    "Germany",
    "United Kingdom",
    "Brazil",
];

const SOURCE_MEDIUMS: [&str; 5] = [
    "google / organic",
    "(direct) / (none)",
    "google / cpc",
    "facebook / social",
    "newsletter / email",
];

/// Deterministic offline data source. The generator is seeded from the
/// configured seed combined with the request fingerprint, so the same
/// request always replays byte-for-byte.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    seed: u64,
}

impl SimulatedBackend {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl AnalyticsBackend for SimulatedBackend {
    fn id(&self) -> BackendId {
        BackendId::Simulated
    }

    async fn run_report(&self, request: &ReportRequest) -> Result<Vec<ReportRow>, BackendError> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ request.fingerprint());
        let mut rows = Vec::new();

        let tagged = request.date_ranges.len() > 1;
        for (index, range) in request.date_ranges.iter().enumerate() {
            let pools: Vec<Vec<String>> = request
                .dimensions
                .iter()
                .map(|dim| dimension_pool(dim, range, request.limit))
                .collect();

            let count = pools
                .iter()
                .map(Vec::len)
                .max()
                .unwrap_or(1)
                .min(request.limit.max(1) as usize);

            for row_idx in 0..count {
                let mut dimension_values: Vec<String> = Vec::new();
                if tagged {
                    dimension_values.push(format!("date_range_{index}"));
                }
                for pool in &pools {
                    dimension_values.push(pool[row_idx % pool.len()].clone());
                }
                let metric_values = request
                    .metrics
                    .iter()
                    .map(|metric| sample_metric(&mut rng, metric))
                    .collect();
                rows.push(ReportRow {
                    dimension_values,
                    metric_values,
                });
            }
        }

        if let Some(order_by) = &request.order_by {
            if let Some(pos) = request.metrics.iter().position(|m| m == &order_by.metric) {
                rows.sort_by(|a, b| {
                    let left = metric_as_f64(a, pos);
                    let right = metric_as_f64(b, pos);
                    if order_by.descending {
                        right.total_cmp(&left)
                    } else {
                        left.total_cmp(&right)
                    }
                });
            }
        }

        Ok(rows)
    }
}

fn metric_as_f64(row: &ReportRow, index: usize) -> f64 {
    row.metric_values
        .get(index)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn dimension_pool(dimension: &str, range: &DateRange, limit: u32) -> Vec<String> {
    let cap = limit.max(1) as usize;
    match dimension {
        "date" => {
            let mut dates = Vec::new();
            let mut cursor = range.start;
            while cursor <= range.end && dates.len() < cap {
                dates.push(cursor.format("%Y%m%d").to_string());
                cursor += chrono::Duration::days(1);
            }
            dates
        }
        "week" => {
            let mut weeks = Vec::new();
            let mut cursor = range.start;
            while cursor <= range.end && weeks.len() < cap {
                weeks.push(cursor.format("%Y%m%d").to_string());
                cursor += chrono::Duration::days(7);
            }
            weeks
        }
        "sessionDefaultChannelGrouping" => to_owned(&CHANNEL_GROUPS),
        "pagePath" | "pageTitle" => to_owned(&PAGE_PATHS),
        "deviceCategory" => to_owned(&DEVICE_CATEGORIES),
        "country" => to_owned(&COUNTRIES),
        "sessionSourceMedium" => to_owned(&SOURCE_MEDIUMS),
        other => (0..4).map(|i| format!("{other}_{i}")).collect(),
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn sample_metric(rng: &mut StdRng, metric: &str) -> String {
    match metric {
        "totalUsers" | "activeUsers" => rng.gen_range(400..6000u64).to_string(),
        "newUsers" => rng.gen_range(100..2000u64).to_string(),
        "sessions" => rng.gen_range(500..9000u64).to_string(),
        "engagedSessions" => rng.gen_range(300..5000u64).to_string(),
        "screenPageViews" | "pageViews" => rng.gen_range(1000..30000u64).to_string(),
        "conversions" => rng.gen_range(5..400u64).to_string(),
        "sessionConversionRate" => format!("{:.4}", rng.gen_range(0.005..0.12f64)),
        "bounceRate" => format!("{:.4}", rng.gen_range(0.15..0.75f64)),
        "totalRevenue" => format!("{:.2}", rng.gen_range(500.0..80000.0f64)),
        "averageSessionDuration" => format!("{:.2}", rng.gen_range(45.0..600.0f64)),
        "sessionsPerUser" => format!("{:.2}", rng.gen_range(1.0..3.5f64)),
        "screenPageViewsPerSession" => format!("{:.2}", rng.gen_range(1.2..6.0f64)),
        _ => rng.gen_range(10..1000u64).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askalytics_schema::OrderBy;
    use chrono::NaiveDate;

    fn range(days: i64) -> DateRange {
        let end = NaiveDate::from_ymd_opt(2025, 1, 24).unwrap();
        DateRange::ending_at(end, days)
    }

    fn request(dimensions: Vec<String>, ranges: Vec<DateRange>) -> ReportRequest {
        ReportRequest {
            property_id: Some("123456".into()),
            metrics: vec!["sessions".into(), "totalUsers".into()],
            dimensions,
            date_ranges: ranges,
            dimension_filters: vec![],
            order_by: None,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn identical_requests_replay_identically() {
        let backend = SimulatedBackend::new(42);
        let req = request(vec!["sessionDefaultChannelGrouping".into()], vec![range(30)]);
        let first = backend.run_report(&req).await.unwrap();
        let second = backend.run_report(&req).await.unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn different_seeds_diverge() {
        let req = request(vec![], vec![range(30)]);
        let a = SimulatedBackend::new(1).run_report(&req).await.unwrap();
        let b = SimulatedBackend::new(2).run_report(&req).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn aggregate_request_yields_single_row() {
        let backend = SimulatedBackend::new(7);
        let rows = backend
            .run_report(&request(vec![], vec![range(30)]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].dimension_values.is_empty());
        assert_eq!(rows[0].metric_values.len(), 2);
    }

    #[tokio::test]
    async fn date_dimension_tracks_the_range() {
        let backend = SimulatedBackend::new(7);
        let mut req = request(vec!["date".into()], vec![range(5)]);
        req.limit = 31;
        let rows = backend.run_report(&req).await.unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].dimension_values[0], "20250120");
        assert_eq!(rows[4].dimension_values[0], "20250124");
    }

    #[tokio::test]
    async fn two_ranges_are_tagged_per_range() {
        let backend = SimulatedBackend::new(7);
        let primary = range(24);
        let req = request(vec![], vec![primary, primary.preceding()]);
        let rows = backend.run_report(&req).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dimension_values, vec!["date_range_0"]);
        assert_eq!(rows[1].dimension_values, vec!["date_range_1"]);
    }

    #[tokio::test]
    async fn order_by_sorts_descending() {
        let backend = SimulatedBackend::new(7);
        let mut req = request(
            vec!["sessionDefaultChannelGrouping".into()],
            vec![range(30)],
        );
        req.order_by = Some(OrderBy {
            metric: "sessions".into(),
            descending: true,
        });
        let rows = backend.run_report(&req).await.unwrap();
        let values: Vec<f64> = rows
            .iter()
            .map(|r| r.metric_values[0].parse::<f64>().unwrap())
            .collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(values, sorted);
    }

    #[tokio::test]
    async fn rate_metrics_are_formatted_as_fractions() {
        let backend = SimulatedBackend::new(9);
        let mut req = request(vec![], vec![range(7)]);
        req.metrics = vec!["bounceRate".into(), "totalRevenue".into()];
        let rows = backend.run_report(&req).await.unwrap();
        let bounce: f64 = rows[0].metric_values[0].parse().unwrap();
        assert!((0.0..=1.0).contains(&bounce));
        let revenue: f64 = rows[0].metric_values[1].parse().unwrap();
        assert!(revenue > 0.0);
    }
}
