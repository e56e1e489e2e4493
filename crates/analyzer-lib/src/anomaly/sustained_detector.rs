//! Sustained high load detection
//!
//! Level-triggered: only the most recent sample is inspected, and every run
//! re-evaluates it. The dedup policy keeps an ongoing condition from
//! producing a report on every run.

use chrono::{DateTime, Utc};

use super::dedup::{DedupKey, DedupPolicy};
use crate::models::{Episode, PatternKind, SampleSeries};
use crate::store::{ReportStore, StoreError};

/// Default high-load threshold in percent
pub const DEFAULT_LOAD_THRESHOLD: f64 = 80.0;

/// Outcome of evaluating one series
#[derive(Debug, Clone, PartialEq)]
pub enum SustainedOutcome {
    /// Empty series or latest value below threshold
    Normal,
    /// High, but already reported within the cooldown
    Suppressed { instance: String, value: f64 },
    /// High and not recently reported
    Detected(Episode),
}

/// Detects an instance currently at or above the load threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SustainedLoadDetector {
    /// Latest values at or above this are high
    pub threshold: f64,
    dedup: DedupPolicy,
}

impl SustainedLoadDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            dedup: DedupPolicy::default(),
        }
    }

    /// Set the dedup policy applied before emitting
    pub fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn dedup(&self) -> &DedupPolicy {
        &self.dedup
    }

    /// Level check on the latest sample, without dedup
    pub fn evaluate(&self, series: &SampleSeries) -> Option<Episode> {
        let latest = series.latest()?;
        if latest.value < self.threshold {
            return None;
        }

        let kind = PatternKind::SustainedHighLoad;
        Some(Episode {
            instance: series.instance.clone(),
            start: latest.timestamp,
            end: latest.timestamp,
            kind,
            severity: kind.severity(),
            observed_value: latest.value,
            details: format!(
                "Instance '{}' is under sustained high CPU load, currently at {:.2}% (threshold: >={:.2}%).",
                series.instance, latest.value, self.threshold
            ),
        })
    }

    /// Level check followed by the dedup lookup against `store`
    pub async fn detect(
        &self,
        series: &SampleSeries,
        store: &dyn ReportStore,
        now: DateTime<Utc>,
    ) -> Result<SustainedOutcome, StoreError> {
        let Some(episode) = self.evaluate(series) else {
            return Ok(SustainedOutcome::Normal);
        };

        let key = DedupKey::new(episode.kind.metric_name(), &episode.instance);
        if self.dedup.has_recent_report(store, &key, now).await? {
            return Ok(SustainedOutcome::Suppressed {
                instance: episode.instance,
                value: episode.observed_value,
            });
        }

        Ok(SustainedOutcome::Detected(episode))
    }
}

impl Default for SustainedLoadDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_THRESHOLD)
    }
}
