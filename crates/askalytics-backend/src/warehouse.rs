use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use askalytics_schema::{BackendId, ReportRow};

use crate::ga4::parse_retry_after;
use crate::{AnalyticsBackend, BackendError, ReportRequest};

/// Batch warehouse backend. Wide date ranges and high-dimensionality
/// descriptors route here; the collaborating service accepts the report
/// request JSON as-is and answers with the same row shape.
#[derive(Debug, Clone)]
pub struct WarehouseBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl WarehouseBackend {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                // Batch scans are slow by nature.
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl AnalyticsBackend for WarehouseBackend {
    fn id(&self) -> BackendId {
        BackendId::Warehouse
    }

    async fn run_report(&self, request: &ReportRequest) -> Result<Vec<ReportRow>, BackendError> {
        let url = format!("{}/jobs/query", self.api_base);

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let status = resp.status();
        if status != StatusCode::OK {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), &body, retry_after));
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Rejected(format!("invalid warehouse response: {e}")))?;
        Ok(body.rows)
    }

    async fn health(&self) -> Result<(), BackendError> {
        if self.api_base.is_empty() {
            return Err(BackendError::Rejected("warehouse base url not set".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use askalytics_schema::DateRange;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ReportRequest {
        ReportRequest {
            property_id: Some("123456".into()),
            metrics: vec!["totalUsers".into()],
            dimensions: vec!["date".into()],
            date_ranges: vec![DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            )],
            dimension_filters: vec![],
            order_by: None,
            limit: 366,
        }
    }

    #[tokio::test]
    async fn run_report_posts_request_shape_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jobs/query"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "property_id": "123456",
                "metrics": ["totalUsers"],
                "dimensions": ["date"],
                "limit": 366
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rows": [
                    {"dimension_values": ["2024-01-01"], "metric_values": ["1034"]},
                    {"dimension_values": ["2024-01-02"], "metric_values": ["1188"]}
                ],
                "row_count": 2
            })))
            .mount(&server)
            .await;

        let backend = WarehouseBackend::new(server.uri(), "secret");
        let rows = backend.run_report(&request()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].metric_values, vec!["1188"]);
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let backend = WarehouseBackend::new(server.uri(), "secret");
        let err = backend.run_report(&request()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let backend = WarehouseBackend::new(server.uri(), "secret");
        let err = backend.run_report(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }
}
