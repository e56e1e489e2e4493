//! Report persistence
//!
//! Reports are append-only history: they are inserted once, read by the
//! dedup policy and listed for presentation, and never mutated.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{NewReport, Report};

pub use memory::MemoryReportStore;
pub use sqlite::SqliteReportStore;

/// Errors raised by a report store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("report store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("report rejected: {0}")]
    Invalid(String),
}

/// Durable storage of analysis reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report, returning it with its assigned id and creation time
    async fn insert(&self, report: NewReport) -> Result<Report, StoreError>;

    /// Whether a report for `(metric_name, instance)` was created at or after `since`
    async fn recent_exists(
        &self,
        metric_name: &str,
        instance: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Whether a report for `(metric_name, instance)` already covers exactly `[start, end]`
    async fn episode_exists(
        &self,
        metric_name: &str,
        instance: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// All reports, newest first
    async fn list_all(&self) -> Result<Vec<Report>, StoreError>;
}

fn validate(report: &NewReport) -> Result<(), StoreError> {
    if report.start_time > report.end_time {
        return Err(StoreError::Invalid(format!(
            "start time {} is after end time {}",
            report.start_time, report.end_time
        )));
    }
    Ok(())
}

fn newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn matches_key(report: &Report, metric_name: &str, instance: &str, since: DateTime<Utc>) -> bool {
    report.metric_name == metric_name && report.instance == instance && report.created_at >= since
}
