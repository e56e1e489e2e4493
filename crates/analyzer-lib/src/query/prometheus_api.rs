//! Prometheus HTTP API client

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{QueryError, QueryExecutor, QueryRange};
use crate::models::{QueryResult, Sample, SampleSeries, UNKNOWN_INSTANCE};

/// Budget for a single range query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

const QUERY_RANGE_PATH: &str = "api/v1/query_range";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Query executor speaking the Prometheus `query_range` API
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
}

impl PrometheusClient {
    /// Create a client for the Prometheus server at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, QueryError> {
        let client = Client::builder().timeout(timeout).build()?;

        // Keep any path prefix (e.g. behind a reverse proxy) when joining
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl QueryExecutor for PrometheusClient {
    async fn query_range(&self, expr: &str, range: QueryRange) -> Result<QueryResult, QueryError> {
        let url = self.base_url.join(QUERY_RANGE_PATH)?;
        let params = [
            ("query", expr.to_string()),
            ("start", format_unix(range.start)),
            ("end", format_unix(range.end)),
            ("step", format!("{}s", range.step.as_secs().max(1))),
        ];

        debug!(url = %url, query = %expr, "Executing range query");

        let response = self.client.get(url).query(&params).send().await?;
        let http_status = response.status();
        let body = response.text().await?;

        let parsed: ApiResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if http_status.is_success() => return Err(QueryError::Decode(e.to_string())),
            Err(_) => {
                return Err(QueryError::Backend {
                    status: http_status.to_string(),
                    message: body,
                })
            }
        };

        parse_response(parsed)
    }
}

fn format_unix(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}

fn parse_response(response: ApiResponse) -> Result<QueryResult, QueryError> {
    if response.status != "success" {
        return Err(QueryError::Backend {
            status: response.error_type.unwrap_or(response.status),
            message: response.error.unwrap_or_default(),
        });
    }

    let data = response
        .data
        .ok_or_else(|| QueryError::Decode("response has no data".to_string()))?;
    if data.result_type != "matrix" {
        return Err(QueryError::UnexpectedResultType(data.result_type));
    }

    let matrix: Vec<MatrixSeries> =
        serde_json::from_value(data.result).map_err(|e| QueryError::Decode(e.to_string()))?;

    let series = matrix
        .into_iter()
        .map(into_series)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult::new(series))
}

fn into_series(raw: MatrixSeries) -> Result<SampleSeries, QueryError> {
    let instance = raw
        .metric
        .get("instance")
        .cloned()
        .unwrap_or_else(|| UNKNOWN_INSTANCE.to_string());

    let samples = raw
        .values
        .into_iter()
        .map(|(ts, value)| {
            let timestamp = Utc
                .timestamp_millis_opt((ts * 1000.0).round() as i64)
                .single()
                .ok_or_else(|| QueryError::Decode(format!("invalid timestamp {}", ts)))?;
            // Prometheus encodes values as strings, including "NaN" and "+Inf"
            let value = value
                .parse::<f64>()
                .map_err(|_| QueryError::Decode(format!("invalid sample value {:?}", value)))?;
            Ok(Sample::new(timestamp, value))
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(SampleSeries::new(instance, samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<QueryResult, QueryError> {
        parse_response(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_parse_matrix() {
        let result = parse(
            r#"{
                "status": "success",
                "data": {
                    "resultType": "matrix",
                    "result": [
                        {"metric": {"instance": "host-1:9100"}, "values": [[1700000000, "10.5"], [1700000060.5, "75"]]},
                        {"metric": {}, "values": [[1700000000, "NaN"]]}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(result.series.len(), 2);
        let first = &result.series[0];
        assert_eq!(first.instance, "host-1:9100");
        assert_eq!(first.len(), 2);
        assert_eq!(first.samples()[1].value, 75.0);
        assert_eq!(first.samples()[1].timestamp.timestamp_millis(), 1_700_000_060_500);

        assert_eq!(result.series[1].instance, UNKNOWN_INSTANCE);
        assert!(result.series[1].samples()[0].value.is_nan());
    }

    #[test]
    fn test_parse_rejects_vector() {
        let err = parse(r#"{"status": "success", "data": {"resultType": "vector", "result": []}}"#)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnexpectedResultType(t) if t == "vector"));
    }

    #[test]
    fn test_parse_backend_error() {
        let err = parse(r#"{"status": "error", "errorType": "bad_data", "error": "parse error"}"#)
            .unwrap_err();
        match err {
            QueryError::Backend { status, message } => {
                assert_eq!(status, "bad_data");
                assert_eq!(message, "parse error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_bad_value() {
        let err = parse(
            r#"{"status": "success", "data": {"resultType": "matrix", "result": [{"metric": {}, "values": [[1700000000, "high"]]}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let client = PrometheusClient::new("http://prom:9090/prometheus", DEFAULT_QUERY_TIMEOUT).unwrap();
        let url = client.base_url().join(QUERY_RANGE_PATH).unwrap();
        assert_eq!(url.as_str(), "http://prom:9090/prometheus/api/v1/query_range");
    }

    #[test]
    fn test_format_unix() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        assert_eq!(format_unix(ts), "1700000000.250");
    }
}
