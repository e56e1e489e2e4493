//! Service configuration

use analyzer_lib::analysis::{AnalysisConfig, CronSchedule, SpikeSettings, SustainedSettings};
use analyzer_lib::notify::{ChatWebhookSink, EmailConfig, EmailSink, NotifierFanout};
use analyzer_lib::query::CPU_USAGE_QUERY;
use analyzer_lib::store::{MemoryReportStore, ReportStore, SqliteReportStore};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Analyzer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// API server port for health, metrics and triggers
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Prometheus-compatible metrics backend
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Range query returning CPU percentage per instance
    #[serde(default = "default_query")]
    pub query: String,

    /// Cron expression for scheduled runs (UTC)
    #[serde(default = "default_schedule")]
    pub schedule: String,

    #[serde(default)]
    pub spike: SpikeSettings,

    #[serde(default)]
    pub sustained: SustainedSettings,

    /// SQLite report history; in-memory when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub chat_webhook_url: Option<String>,

    #[serde(default)]
    pub email: Option<EmailConfig>,
}

fn default_api_port() -> u16 {
    8080
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_query_timeout() -> u64 {
    10
}

fn default_query() -> String {
    CPU_USAGE_QUERY.to_string()
}

fn default_schedule() -> String {
    analyzer_lib::analysis::DEFAULT_SCHEDULE.to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            prometheus_url: default_prometheus_url(),
            query_timeout_secs: default_query_timeout(),
            query: default_query(),
            schedule: default_schedule(),
            spike: SpikeSettings::default(),
            sustained: SustainedSettings::default(),
            store_path: None,
            chat_webhook_url: None,
            email: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from an optional `analyzer` file and the environment
    ///
    /// Environment keys use the `ANALYZER` prefix and `__` for nesting, e.g.
    /// `ANALYZER__SUSTAINED__THRESHOLD=85`.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("analyzer").required(false))
            .add_source(
                config::Environment::with_prefix("ANALYZER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis().validate()?;
        self.cron_schedule()?;
        if self.query_timeout_secs == 0 {
            anyhow::bail!("query_timeout_secs must be non-zero");
        }
        Ok(())
    }

    pub fn analysis(&self) -> AnalysisConfig {
        AnalysisConfig {
            query: self.query.clone(),
            spike: self.spike.clone(),
            sustained: self.sustained.clone(),
        }
    }

    pub fn cron_schedule(&self) -> Result<CronSchedule> {
        CronSchedule::parse(&self.schedule)
            .with_context(|| format!("invalid schedule {:?}", self.schedule))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// SQLite store when `store_path` is set, otherwise in-memory
    pub async fn build_store(&self) -> Result<Arc<dyn ReportStore>> {
        match &self.store_path {
            Some(path) => {
                let store = SqliteReportStore::open(path)
                    .await
                    .with_context(|| format!("failed to open report store {}", path.display()))?;
                info!(path = %path.display(), "Using SQLite report store");
                Ok(Arc::new(store))
            }
            None => {
                info!("Using in-memory report store, history is lost on restart");
                Ok(Arc::new(MemoryReportStore::new()))
            }
        }
    }

    /// Fan-out over every configured sink
    pub fn build_notifier(&self) -> Result<NotifierFanout> {
        let mut notifier = NotifierFanout::new();
        if let Some(url) = &self.chat_webhook_url {
            notifier = notifier.with_sink(Arc::new(ChatWebhookSink::new(url.clone())?));
        }
        if let Some(email) = &self.email {
            notifier = notifier.with_sink(Arc::new(
                EmailSink::new(email).context("failed to configure email sink")?,
            ));
        }
        Ok(notifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cron_schedule().unwrap().to_string(), "5 * * * *");
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_bad_schedule() {
        let config = AnalyzerConfig {
            schedule: "every hour".to_string(),
            ..AnalyzerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = AnalyzerConfig::default();
        config.spike.base_threshold = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_settings_from_source() {
        let source = config::Config::builder()
            .set_override("sustained.threshold", 85.0)
            .unwrap()
            .set_override("chat_webhook_url", "http://chat.local/hook")
            .unwrap()
            .build()
            .unwrap();

        let config: AnalyzerConfig = source.try_deserialize().unwrap();
        assert_eq!(config.sustained.threshold, 85.0);
        assert_eq!(config.sustained.cooldown_secs, 1800);
        assert_eq!(config.build_notifier().unwrap().sink_names(), vec!["chat_webhook"]);
    }

    #[tokio::test]
    async fn test_memory_store_without_path() {
        let store = AnalyzerConfig::default().build_store().await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
