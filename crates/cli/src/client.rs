//! API client for the pattern analyzer service

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the analyzer HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn list_reports(&self) -> Result<Vec<Report>> {
        self.get("api/reports").await
    }

    pub async fn trigger(&self, kind: AnalysisTarget) -> Result<TriggerAck> {
        self.post(kind.path()).await
    }
}

/// Which on-demand analysis to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AnalysisTarget {
    /// Transient CPU spikes over the last hour
    Spike,
    /// Current sustained high CPU load
    Sustained,
}

impl AnalysisTarget {
    fn path(&self) -> &'static str {
        match self {
            AnalysisTarget::Spike => "api/analyze/cpu-spike",
            AnalysisTarget::Sustained => "api/analyze/cpu-high-load",
        }
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub metric_name: String,
    pub pattern_detected: String,
    pub severity: String,
    #[serde(default)]
    pub instance: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAck {
    pub kind: String,
    pub message: String,
    pub accepted_at: DateTime<Utc>,
}
