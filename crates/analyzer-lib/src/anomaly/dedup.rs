//! Alert deduplication against report history
//!
//! Suppression is a read against the report store rather than an in-memory
//! cache, so it holds across restarts and across concurrent analyzers that
//! share a store. Two runs racing on the same key may both see no recent
//! report and both insert; that double alert is tolerated.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{ReportStore, StoreError};

/// Default cooldown between reports for the same condition (30 minutes)
pub const DEFAULT_COOLDOWN_SECS: u64 = 30 * 60;

/// Structured key a report is deduplicated on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub metric_name: String,
    pub instance: String,
}

impl DedupKey {
    pub fn new(metric_name: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            instance: instance.into(),
        }
    }
}

/// Fixed-cooldown suppression rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupPolicy {
    cooldown: Duration,
}

impl DedupPolicy {
    pub fn new(cooldown: std::time::Duration) -> Self {
        Self {
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::days(36_500)),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Earliest creation time that still suppresses a new report at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether a report for `key` was created within the cooldown before `now`
    pub async fn has_recent_report(
        &self,
        store: &dyn ReportStore,
        key: &DedupKey,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        store
            .recent_exists(&key.metric_name, &key.instance, self.window_start(now))
            .await
    }
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}
