//! Range queries against the metrics backend

mod prometheus_api;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::models::QueryResult;

pub use prometheus_api::{PrometheusClient, DEFAULT_QUERY_TIMEOUT};

/// Average non-idle CPU percentage per instance
pub const CPU_USAGE_QUERY: &str =
    r#"100 - (avg by (instance) (rate(node_cpu_seconds_total{mode="idle"}[2m])) * 100)"#;

/// Errors raised while executing a range query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("metrics backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics backend returned an error ({status}): {message}")]
    Backend { status: String, message: String },

    #[error("expected a matrix result, got {0}")]
    UnexpectedResultType(String),

    #[error("failed to decode query response: {0}")]
    Decode(String),

    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Time range and resolution of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl QueryRange {
    /// Range ending at `end` and reaching back `lookback`
    pub fn lookback(end: DateTime<Utc>, lookback: Duration, step: Duration) -> Self {
        let start = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|d| end.checked_sub_signed(d))
            .unwrap_or(end);
        Self { start, end, step }
    }
}

/// Executes range queries, returning one series per instance
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn query_range(&self, expr: &str, range: QueryRange) -> Result<QueryResult, QueryError>;
}
