//! SQLite report store
//!
//! Every insert is a single committed row, so an interrupted write never
//! damages reports that were already stored. Lookups run as indexed queries
//! instead of scanning history in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::{validate, ReportStore, StoreError};
use crate::models::{NewReport, Report, Severity};

const REPORTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_name TEXT NOT NULL,
    pattern_detected TEXT NOT NULL,
    severity TEXT NOT NULL,
    instance TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    details TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reports_metric_instance_created
    ON reports(metric_name, instance, created_at);
";

const SELECT_COLUMNS: &str = "SELECT id, metric_name, pattern_detected, severity, instance, start_time, end_time, details, created_at FROM reports";

/// Report store backed by a single SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteReportStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportStore {
    /// Open (or create) the database at `path` and apply the schema
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db_path = path.clone();
        let (conn, count) = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn.execute_batch(REPORTS_SCHEMA)?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
            Ok((conn, count))
        })
        .await??;

        info!(path = %path.display(), reports = count, "Opened report store");

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn);
            f(&guard)
        })
        .await?
    }
}

/// Lock the connection, recovering from a poisoned mutex
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp {} out of range", ms).into(),
        )
    })
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let severity: String = row.get(3)?;
    let severity = severity.parse::<Severity>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Report {
        id: row.get(0)?,
        metric_name: row.get(1)?,
        pattern_detected: row.get(2)?,
        severity,
        instance: row.get(4)?,
        start_time: from_millis(5, row.get(5)?)?,
        end_time: from_millis(6, row.get(6)?)?,
        details: row.get(7)?,
        created_at: from_millis(8, row.get(8)?)?,
    })
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn insert(&self, report: NewReport) -> Result<Report, StoreError> {
        validate(&report)?;

        // Stored at millisecond precision; the returned report matches what reloads
        let now = Utc::now();
        let created_at = DateTime::from_timestamp_millis(to_millis(now)).unwrap_or(now);

        let stored = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO reports (metric_name, pattern_detected, severity, instance, start_time, end_time, details, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        &report.metric_name,
                        &report.pattern_detected,
                        report.severity.to_string(),
                        &report.instance,
                        to_millis(report.start_time),
                        to_millis(report.end_time),
                        &report.details,
                        to_millis(created_at),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                Ok(Report::from_new(id, report, created_at))
            })
            .await?;

        debug!(id = stored.id, path = %self.path.display(), "Report inserted");
        Ok(stored)
    }

    async fn recent_exists(
        &self,
        metric_name: &str,
        instance: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let metric_name = metric_name.to_string();
        let instance = instance.to_string();
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM reports WHERE metric_name = ?1 AND instance = ?2 AND created_at >= ?3)",
                rusqlite::params![metric_name, instance, to_millis(since)],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn episode_exists(
        &self,
        metric_name: &str,
        instance: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let metric_name = metric_name.to_string();
        let instance = instance.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT id FROM reports WHERE metric_name = ?1 AND instance = ?2 AND start_time = ?3 AND end_time = ?4 LIMIT 1",
                    rusqlite::params![metric_name, instance, to_millis(start), to_millis(end)],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Report>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS))?;
            let rows = stmt.query_map([], row_to_report)?;
            let mut reports = Vec::new();
            for row in rows {
                reports.push(row?);
            }
            Ok(reports)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn new_report(instance: &str) -> NewReport {
        let now = Utc::now();
        NewReport {
            metric_name: "cpu_sustained_high".to_string(),
            pattern_detected: "Sustained High CPU Load".to_string(),
            severity: Severity::Critical,
            instance: instance.to_string(),
            start_time: now,
            end_time: now,
            details: "load".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reports_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports.db");

        {
            let store = SqliteReportStore::open(&path).await.unwrap();
            store.insert(new_report("host-1")).await.unwrap();
            store.insert(new_report("host-2")).await.unwrap();
        }

        let reopened = SqliteReportStore::open(&path).await.unwrap();
        let reports = reopened.list_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].instance, "host-2");
        assert_eq!(reports[0].severity, Severity::Critical);

        let since = Utc::now() - Duration::minutes(30);
        assert!(reopened
            .recent_exists("cpu_sustained_high", "host-1", since)
            .await
            .unwrap());

        let next = reopened.insert(new_report("host-3")).await.unwrap();
        assert_eq!(next.id, 3);
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_later_reports() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports.db");

        let store = SqliteReportStore::open(&path).await.unwrap();
        store.insert(new_report("host-0")).await.unwrap();
        drop(store);

        // A writer that dies before committing leaves only a rolled-back row
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "BEGIN;
                 INSERT INTO reports (metric_name, pattern_detected, severity, instance, start_time, end_time, details, created_at)
                 VALUES ('cpu_sustained_high', 'Sustained High CPU Load', 'critical', 'torn', 0, 0, 'partial', 0);",
            )
            .unwrap();
        }

        let store = SqliteReportStore::open(&path).await.unwrap();
        store.insert(new_report("host-1")).await.unwrap();
        drop(store);

        let reopened = SqliteReportStore::open(&path).await.unwrap();
        let since = Utc::now() - Duration::minutes(30);
        assert!(reopened
            .recent_exists("cpu_sustained_high", "host-1", since)
            .await
            .unwrap());

        let instances: Vec<String> = reopened
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.instance)
            .collect();
        assert_eq!(instances, vec!["host-1".to_string(), "host-0".to_string()]);
    }

    #[tokio::test]
    async fn test_recent_exists_uses_exact_instance() {
        let dir = TempDir::new().unwrap();
        let store = SqliteReportStore::open(dir.path().join("reports.db")).await.unwrap();
        store.insert(new_report("host-10")).await.unwrap();
        let since = Utc::now() - Duration::minutes(30);

        assert!(store.recent_exists("cpu_sustained_high", "host-10", since).await.unwrap());
        assert!(!store.recent_exists("cpu_sustained_high", "host-1", since).await.unwrap());
        assert!(!store.recent_exists("cpu_transient_spike", "host-10", since).await.unwrap());

        let future = Utc::now() + Duration::minutes(1);
        assert!(!store.recent_exists("cpu_sustained_high", "host-10", future).await.unwrap());
    }

    #[tokio::test]
    async fn test_episode_exists_matches_window() {
        let dir = TempDir::new().unwrap();
        let store = SqliteReportStore::open(dir.path().join("reports.db")).await.unwrap();

        let start = Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap();
        let end = start + Duration::minutes(2);
        let mut report = new_report("web-1");
        report.metric_name = "cpu_transient_spike".to_string();
        report.start_time = start;
        report.end_time = end;
        store.insert(report).await.unwrap();

        assert!(store.episode_exists("cpu_transient_spike", "web-1", start, end).await.unwrap());
        assert!(!store
            .episode_exists("cpu_transient_spike", "web-1", start, end + Duration::minutes(1))
            .await
            .unwrap());
        assert!(!store.episode_exists("cpu_transient_spike", "web-2", start, end).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_inverted_window() {
        let dir = TempDir::new().unwrap();
        let store = SqliteReportStore::open(dir.path().join("reports.db")).await.unwrap();
        let mut report = new_report("a");
        report.start_time = report.end_time + Duration::seconds(1);

        assert!(matches!(store.insert(report).await, Err(StoreError::Invalid(_))));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store").join("reports.db");

        let store = SqliteReportStore::open(&path).await.unwrap();
        store.insert(new_report("host-1")).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }
}
