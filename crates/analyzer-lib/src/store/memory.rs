//! In-process report store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{matches_key, newest_first, validate, ReportStore, StoreError};
use crate::models::{NewReport, Report};

#[derive(Debug, Default)]
struct Inner {
    reports: Vec<Report>,
    next_id: i64,
}

/// Report store kept entirely in memory
///
/// History is lost on restart; use [`super::SqliteReportStore`] when dedup
/// must survive the process.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    inner: RwLock<Inner>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reports
    pub async fn len(&self) -> usize {
        self.inner.read().await.reports.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert(&self, report: NewReport) -> Result<Report, StoreError> {
        validate(&report)?;

        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let stored = Report::from_new(inner.next_id, report, Utc::now());
        inner.reports.push(stored.clone());
        Ok(stored)
    }

    async fn recent_exists(
        &self,
        metric_name: &str,
        instance: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .reports
            .iter()
            .any(|r| matches_key(r, metric_name, instance, since)))
    }

    async fn episode_exists(
        &self,
        metric_name: &str,
        instance: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.reports.iter().any(|r| {
            r.metric_name == metric_name && r.instance == instance && r.start_time == start && r.end_time == end
        }))
    }

    async fn list_all(&self) -> Result<Vec<Report>, StoreError> {
        let mut reports = self.inner.read().await.reports.clone();
        newest_first(&mut reports);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::Duration;

    fn new_report(metric: &str, instance: &str) -> NewReport {
        let now = Utc::now();
        NewReport {
            metric_name: metric.to_string(),
            pattern_detected: "Sustained High CPU Load".to_string(),
            severity: Severity::Critical,
            instance: instance.to_string(),
            start_time: now,
            end_time: now,
            details: format!("Instance '{}' is busy", instance),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = MemoryReportStore::new();
        let first = store.insert(new_report("cpu_sustained_high", "a")).await.unwrap();
        let second = store.insert(new_report("cpu_sustained_high", "b")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let store = MemoryReportStore::new();
        store.insert(new_report("m", "a")).await.unwrap();
        store.insert(new_report("m", "b")).await.unwrap();

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed[0].instance, "b");
        assert_eq!(listed[1].instance, "a");
    }

    #[tokio::test]
    async fn test_recent_exists_uses_exact_instance() {
        let store = MemoryReportStore::new();
        store.insert(new_report("cpu_sustained_high", "host-10")).await.unwrap();
        let since = Utc::now() - Duration::minutes(30);

        assert!(store.recent_exists("cpu_sustained_high", "host-10", since).await.unwrap());
        // "host-1" is a substring of "host-10" and of its details text
        assert!(!store.recent_exists("cpu_sustained_high", "host-1", since).await.unwrap());
        assert!(!store.recent_exists("cpu_transient_spike", "host-10", since).await.unwrap());
    }

    #[tokio::test]
    async fn test_recent_exists_respects_since() {
        let store = MemoryReportStore::new();
        store.insert(new_report("m", "a")).await.unwrap();

        let future = Utc::now() + Duration::minutes(1);
        assert!(!store.recent_exists("m", "a", future).await.unwrap());
    }

    #[tokio::test]
    async fn test_episode_exists_requires_same_window() {
        let store = MemoryReportStore::new();
        let stored = store.insert(new_report("cpu_transient_spike", "a")).await.unwrap();

        assert!(store
            .episode_exists("cpu_transient_spike", "a", stored.start_time, stored.end_time)
            .await
            .unwrap());
        assert!(!store
            .episode_exists("cpu_transient_spike", "a", stored.start_time, stored.end_time + Duration::seconds(15))
            .await
            .unwrap());
        assert!(!store
            .episode_exists("cpu_sustained_high", "a", stored.start_time, stored.end_time)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_rejects_inverted_window() {
        let store = MemoryReportStore::new();
        let mut report = new_report("m", "a");
        report.start_time = report.end_time + Duration::seconds(1);

        assert!(matches!(store.insert(report).await, Err(StoreError::Invalid(_))));
        assert!(store.is_empty().await);
    }
}
