//! Analysis orchestration and run triggers
//!
//! An analysis run queries the metrics backend for one window, runs one
//! detector over every returned series and turns each episode into a
//! persisted, dispatched report. Runs are started by the cron scheduler or
//! on demand.

mod orchestrator;
mod schedule;
mod scheduler;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::anomaly::{
    DedupPolicy, SpikeDetector, SustainedLoadDetector, DEFAULT_BASE_THRESHOLD,
    DEFAULT_COOLDOWN_SECS, DEFAULT_LOAD_THRESHOLD, DEFAULT_SPIKE_THRESHOLD,
};
use crate::query::{QueryError, CPU_USAGE_QUERY};

pub use orchestrator::{AnalysisOrchestrator, RunSummary};
pub use schedule::{CronSchedule, ScheduleError, DEFAULT_SCHEDULE};
pub use scheduler::{run_tick, AnalysisScheduler, AnalysisTrigger, TriggerAck};

/// Which detector a run applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Spike,
    SustainedLoad,
}

impl AnalysisKind {
    /// Every kind, in the order a scheduled tick runs them
    pub const ALL: [AnalysisKind; 2] = [AnalysisKind::Spike, AnalysisKind::SustainedLoad];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Spike => "spike",
            AnalysisKind::SustainedLoad => "sustained_load",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a single analysis run
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{kind} analysis aborted: {source}")]
    Query {
        kind: AnalysisKind,
        #[source]
        source: QueryError,
    },
}

/// Rejected analysis settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid analysis configuration: {0}")]
    Invalid(String),
}

fn default_query() -> String {
    CPU_USAGE_QUERY.to_string()
}

fn default_step_secs() -> u64 {
    60
}

fn default_base_threshold() -> f64 {
    DEFAULT_BASE_THRESHOLD
}

fn default_spike_threshold() -> f64 {
    DEFAULT_SPIKE_THRESHOLD
}

fn default_spike_lookback_secs() -> u64 {
    60 * 60
}

fn default_load_threshold() -> f64 {
    DEFAULT_LOAD_THRESHOLD
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_sustained_lookback_secs() -> u64 {
    5 * 60
}

/// Transient spike analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeSettings {
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f64,
    #[serde(default = "default_spike_threshold")]
    pub spike_threshold: f64,
    #[serde(default = "default_spike_lookback_secs")]
    pub lookback_secs: u64,
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,
}

impl Default for SpikeSettings {
    fn default() -> Self {
        Self {
            base_threshold: default_base_threshold(),
            spike_threshold: default_spike_threshold(),
            lookback_secs: default_spike_lookback_secs(),
            step_secs: default_step_secs(),
        }
    }
}

/// Sustained high load analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SustainedSettings {
    #[serde(default = "default_load_threshold")]
    pub threshold: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Only the latest point is used; a short window keeps backend load small
    #[serde(default = "default_sustained_lookback_secs")]
    pub lookback_secs: u64,
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,
}

impl Default for SustainedSettings {
    fn default() -> Self {
        Self {
            threshold: default_load_threshold(),
            cooldown_secs: default_cooldown_secs(),
            lookback_secs: default_sustained_lookback_secs(),
            step_secs: default_step_secs(),
        }
    }
}

/// Query window of one analysis kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub lookback: Duration,
    pub step: Duration,
}

/// Settings shared by all analysis runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Range query returning CPU percentage per instance
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default)]
    pub spike: SpikeSettings,
    #[serde(default)]
    pub sustained: SustainedSettings,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            spike: SpikeSettings::default(),
            sustained: SustainedSettings::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.trim().is_empty() {
            return Err(ConfigError::Invalid("query must not be empty".to_string()));
        }
        if !self.spike_detector().is_valid() {
            return Err(ConfigError::Invalid(format!(
                "spike base threshold {} must be below spike threshold {}",
                self.spike.base_threshold, self.spike.spike_threshold
            )));
        }
        if !self.sustained.threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "sustained threshold must be a finite number".to_string(),
            ));
        }
        for (name, value) in [
            ("spike.lookback_secs", self.spike.lookback_secs),
            ("spike.step_secs", self.spike.step_secs),
            ("sustained.lookback_secs", self.sustained.lookback_secs),
            ("sustained.step_secs", self.sustained.step_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    pub fn window(&self, kind: AnalysisKind) -> AnalysisWindow {
        let (lookback, step) = match kind {
            AnalysisKind::Spike => (self.spike.lookback_secs, self.spike.step_secs),
            AnalysisKind::SustainedLoad => (self.sustained.lookback_secs, self.sustained.step_secs),
        };
        AnalysisWindow {
            lookback: Duration::from_secs(lookback),
            step: Duration::from_secs(step),
        }
    }

    pub fn spike_detector(&self) -> SpikeDetector {
        SpikeDetector::new(self.spike.base_threshold, self.spike.spike_threshold)
    }

    pub fn sustained_detector(&self) -> SustainedLoadDetector {
        SustainedLoadDetector::new(self.sustained.threshold).with_dedup(DedupPolicy::new(
            Duration::from_secs(self.sustained.cooldown_secs),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());

        let spike = config.window(AnalysisKind::Spike);
        assert_eq!(spike.lookback, Duration::from_secs(3600));
        assert_eq!(spike.step, Duration::from_secs(60));

        let sustained = config.window(AnalysisKind::SustainedLoad);
        assert_eq!(sustained.lookback, Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_inverted_spike_thresholds() {
        let mut config = AnalysisConfig::default();
        config.spike.base_threshold = 80.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_step() {
        let mut config = AnalysisConfig::default();
        config.sustained.step_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_settings() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"sustained": {"threshold": 90.0}}"#).unwrap();
        assert_eq!(config.sustained.threshold, 90.0);
        assert_eq!(config.sustained.cooldown_secs, 1800);
        assert_eq!(config.spike, SpikeSettings::default());
        assert_eq!(config.query, CPU_USAGE_QUERY);
    }

    #[test]
    fn test_sustained_detector_uses_cooldown() {
        let mut config = AnalysisConfig::default();
        config.sustained.cooldown_secs = 600;
        let detector = config.sustained_detector();
        assert_eq!(detector.dedup().cooldown(), chrono::Duration::minutes(10));
    }
}
