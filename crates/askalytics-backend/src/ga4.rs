use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use askalytics_schema::{BackendId, ReportRow};

use crate::{AnalyticsBackend, BackendError, ReportRequest};

const DEFAULT_API_BASE: &str = "https://analyticsdata.googleapis.com";

/// Live Google Analytics Data API backend. Narrow, low-cardinality
/// queries land here.
#[derive(Debug, Clone)]
pub struct Ga4ApiBackend {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl Ga4ApiBackend {
    pub fn new(access_token: impl Into<String>, api_base: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_base: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            access_token: access_token.into(),
        }
    }

    fn to_api_request(request: &ReportRequest) -> ApiRequest {
        let dimension_filter = if request.dimension_filters.is_empty() {
            None
        } else {
            Some(ApiFilterExpression {
                and_group: ApiFilterGroup {
                    expressions: request
                        .dimension_filters
                        .iter()
                        .map(|f| ApiFilterLeaf {
                            filter: ApiFilter {
                                field_name: f.dimension.clone(),
                                string_filter: ApiStringFilter {
                                    value: f.value.clone(),
                                },
                            },
                        })
                        .collect(),
                },
            })
        };

        let order_bys = request.order_by.as_ref().map(|ob| {
            vec![ApiOrderBy {
                metric: ApiMetricOrderBy {
                    metric_name: ob.metric.clone(),
                },
                desc: ob.descending,
            }]
        });

        ApiRequest {
            date_ranges: request
                .date_ranges
                .iter()
                .map(|r| ApiDateRange {
                    start_date: r.start.to_string(),
                    end_date: r.end.to_string(),
                })
                .collect(),
            metrics: request
                .metrics
                .iter()
                .map(|name| ApiName { name: name.clone() })
                .collect(),
            dimensions: request
                .dimensions
                .iter()
                .map(|name| ApiName { name: name.clone() })
                .collect(),
            dimension_filter,
            order_bys,
            limit: request.limit,
        }
    }
}

#[async_trait]
impl AnalyticsBackend for Ga4ApiBackend {
    fn id(&self) -> BackendId {
        BackendId::Ga4Api
    }

    async fn run_report(&self, request: &ReportRequest) -> Result<Vec<ReportRow>, BackendError> {
        let property = request
            .property_id
            .as_deref()
            .ok_or_else(|| BackendError::Rejected("ga4 requires a property id".into()))?;
        let url = format!(
            "{}/v1beta/properties/{}:runReport",
            self.api_base, property
        );
        let payload = Self::to_api_request(request);

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let status = resp.status();
        if status != StatusCode::OK {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), &body, retry_after));
        }

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Rejected(format!("invalid ga4 response: {e}")))?;

        Ok(body
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| ReportRow {
                dimension_values: row
                    .dimension_values
                    .into_iter()
                    .map(|v| v.value.unwrap_or_default())
                    .collect(),
                metric_values: row
                    .metric_values
                    .into_iter()
                    .map(|v| v.value.unwrap_or_default())
                    .collect(),
            })
            .collect())
    }

    async fn health(&self) -> Result<(), BackendError> {
        if self.access_token.is_empty() {
            return Err(BackendError::Auth("missing ga4 access token".into()));
        }
        Ok(())
    }
}

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    date_ranges: Vec<ApiDateRange>,
    metrics: Vec<ApiName>,
    dimensions: Vec<ApiName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_filter: Option<ApiFilterExpression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_bys: Option<Vec<ApiOrderBy>>,
    limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiDateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
struct ApiName {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiFilterExpression {
    and_group: ApiFilterGroup,
}

#[derive(Debug, Serialize)]
struct ApiFilterGroup {
    expressions: Vec<ApiFilterLeaf>,
}

#[derive(Debug, Serialize)]
struct ApiFilterLeaf {
    filter: ApiFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiFilter {
    field_name: String,
    string_filter: ApiStringFilter,
}

#[derive(Debug, Serialize)]
struct ApiStringFilter {
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiOrderBy {
    metric: ApiMetricOrderBy,
    desc: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiMetricOrderBy {
    metric_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    rows: Option<Vec<ApiRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRow {
    #[serde(default)]
    dimension_values: Vec<ApiValue>,
    #[serde(default)]
    metric_values: Vec<ApiValue>,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    #[serde(default)]
    value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use askalytics_schema::{DateRange, DimensionFilter, OrderBy};
    use chrono::NaiveDate;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ReportRequest {
        ReportRequest {
            property_id: Some("123456".into()),
            metrics: vec!["sessions".into(), "totalUsers".into()],
            dimensions: vec!["sessionDefaultChannelGrouping".into()],
            date_ranges: vec![DateRange::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 24).unwrap(),
            )],
            dimension_filters: vec![DimensionFilter {
                dimension: "deviceCategory".into(),
                value: "mobile".into(),
            }],
            order_by: Some(OrderBy {
                metric: "sessions".into(),
                descending: true,
            }),
            limit: 10,
        }
    }

    #[tokio::test]
    async fn run_report_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/properties/123456:runReport"))
            .and(body_partial_json(serde_json::json!({
                "dateRanges": [{"startDate": "2025-01-01", "endDate": "2025-01-24"}],
                "metrics": [{"name": "sessions"}, {"name": "totalUsers"}],
                "limit": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rows": [
                    {
                        "dimensionValues": [{"value": "Organic Search"}],
                        "metricValues": [{"value": "800"}, {"value": "600"}]
                    },
                    {
                        "dimensionValues": [{"value": "Direct"}],
                        "metricValues": [{"value": "500"}, {"value": "400"}]
                    }
                ],
                "rowCount": 2
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let backend = Ga4ApiBackend::new("token", Some(uri.as_str()));
        let rows = backend.run_report(&request()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dimension_values, vec!["Organic Search"]);
        assert_eq!(rows[0].metric_values, vec!["800", "600"]);
    }

    #[tokio::test]
    async fn empty_report_yields_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let backend = Ga4ApiBackend::new("token", Some(uri.as_str()));
        let rows = backend.run_report(&request()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_maps_to_transient_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "3")
                    .set_body_string("rate limited"),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let backend = Ga4ApiBackend::new("token", Some(uri.as_str()));
        let err = backend.run_report(&request()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let backend = Ga4ApiBackend::new("token", Some(uri.as_str()));
        let err = backend.run_report(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));
    }

    #[tokio::test]
    async fn quota_exhaustion_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("RESOURCE_EXHAUSTED: daily quota"),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let backend = Ga4ApiBackend::new("token", Some(uri.as_str()));
        let err = backend.run_report(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::QuotaExhausted(_)));
    }

    #[tokio::test]
    async fn missing_property_is_rejected_without_io() {
        let backend = Ga4ApiBackend::new("token", Some("http://127.0.0.1:1"));
        let mut req = request();
        req.property_id = None;
        let err = backend.run_report(&req).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }
}
