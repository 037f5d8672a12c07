pub mod error;
pub mod ga4;
pub mod router;
pub mod simulated;
pub mod warehouse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use askalytics_schema::{
    BackendId, DateRange, DimensionFilter, OrderBy, QueryDescriptor, ReportRow,
};

pub use error::{BackendError, TransientKind};
pub use ga4::Ga4ApiBackend;
pub use router::{ExecutionMode, ExecutionRouter, ExecutionState, RetryPolicy, RoutingPolicy};
pub use simulated::SimulatedBackend;
pub use warehouse::WarehouseBackend;

/// The provider-facing request shape. Every backend accepts exactly this;
/// the router depends on nothing provider-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub property_id: Option<String>,
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub date_ranges: Vec<DateRange>,
    #[serde(default)]
    pub dimension_filters: Vec<DimensionFilter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    pub limit: u32,
}

impl From<&QueryDescriptor> for ReportRequest {
    fn from(descriptor: &QueryDescriptor) -> Self {
        Self {
            property_id: descriptor.property_id.clone(),
            metrics: descriptor.metrics.clone(),
            dimensions: descriptor.dimensions.clone(),
            date_ranges: descriptor.date_ranges.clone(),
            dimension_filters: descriptor.filters.clone(),
            order_by: descriptor.order_by.clone(),
            limit: descriptor.limit,
        }
    }
}

impl ReportRequest {
    pub fn primary_range(&self) -> &DateRange {
        &self.date_ranges[0]
    }

    /// Stable 64-bit fingerprint over the canonical JSON form. Used to
    /// seed the simulated backend so identical requests replay identically.
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).expect("request serializes");
        fnv1a(&bytes)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// A data source able to execute a report request: the live GA4 Data API,
/// the warehouse batch service, or the deterministic simulator.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    fn id(&self) -> BackendId;

    async fn run_report(&self, request: &ReportRequest) -> Result<Vec<ReportRow>, BackendError>;

    async fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askalytics_schema::QueryIntent;
    use chrono::NaiveDate;

    fn sample_descriptor() -> QueryDescriptor {
        QueryDescriptor {
            intent: QueryIntent::BasicMetric,
            property_id: Some("123456".into()),
            date_ranges: vec![DateRange::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 24).unwrap(),
            )],
            metrics: vec!["totalUsers".into(), "sessions".into()],
            dimensions: vec![],
            filters: vec![],
            order_by: None,
            limit: 10,
            clamps: vec![],
        }
    }

    #[test]
    fn request_mirrors_descriptor() {
        let descriptor = sample_descriptor();
        let request = ReportRequest::from(&descriptor);
        assert_eq!(request.property_id.as_deref(), Some("123456"));
        assert_eq!(request.metrics, descriptor.metrics);
        assert_eq!(request.date_ranges, descriptor.date_ranges);
        assert_eq!(request.limit, 10);
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let descriptor = sample_descriptor();
        let a = ReportRequest::from(&descriptor);
        let b = ReportRequest::from(&descriptor);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = ReportRequest::from(&descriptor);
        c.limit = 11;
        assert_ne!(a.fingerprint(), c.fingerprint());

        let mut d = ReportRequest::from(&descriptor);
        d.metrics.reverse();
        assert_ne!(a.fingerprint(), d.fingerprint());
    }
}
