//! Core data models for the pattern analyzer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instance label used when a series carries no `instance` label
pub const UNKNOWN_INSTANCE: &str = "unknown";

/// A single observation of the monitored metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Percentage, nominally in [0, 100]; out-of-range values pass through
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Time-ordered samples for exactly one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    pub instance: String,
    samples: Vec<Sample>,
}

impl SampleSeries {
    /// Build a series, ordering samples by timestamp
    pub fn new(instance: impl Into<String>, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self {
            instance: instance.into(),
            samples,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Most recent observation
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One series per distinct instance returned by the metrics backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub series: Vec<SampleSeries>,
}

impl QueryResult {
    pub fn new(series: Vec<SampleSeries>) -> Self {
        Self { series }
    }
}

/// Report severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Temporal pattern recognised by a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    TransientSpike,
    SustainedHighLoad,
}

impl PatternKind {
    /// Metric tag stored on reports and used as the dedup namespace
    pub fn metric_name(&self) -> &'static str {
        match self {
            PatternKind::TransientSpike => "cpu_transient_spike",
            PatternKind::SustainedHighLoad => "cpu_sustained_high",
        }
    }

    /// Human-readable classification
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::TransientSpike => "Transient CPU Spike",
            PatternKind::SustainedHighLoad => "Sustained High CPU Load",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PatternKind::TransientSpike => Severity::Warning,
            PatternKind::SustainedHighLoad => Severity::Critical,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Transient detector finding, never persisted directly
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub instance: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: PatternKind,
    pub severity: Severity,
    /// Peak value of a spike, or the latest value for sustained load
    pub observed_value: f64,
    pub details: String,
}

/// A report before the store assigns its id and creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub metric_name: String,
    pub pattern_detected: String,
    pub severity: Severity,
    pub instance: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub details: String,
}

impl From<&Episode> for NewReport {
    fn from(episode: &Episode) -> Self {
        Self {
            metric_name: episode.kind.metric_name().to_string(),
            pattern_detected: episode.kind.label().to_string(),
            severity: episode.severity,
            instance: episode.instance.clone(),
            start_time: episode.start,
            end_time: episode.end,
            details: episode.details.clone(),
        }
    }
}

/// Persisted, immutable analysis report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub metric_name: String,
    pub pattern_detected: String,
    pub severity: Severity,
    pub instance: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Materialise a new report with store-assigned fields
    pub fn from_new(id: i64, report: NewReport, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            metric_name: report.metric_name,
            pattern_detected: report.pattern_detected,
            severity: report.severity,
            instance: report.instance,
            start_time: report.start_time,
            end_time: report.end_time,
            details: report.details,
            created_at,
        }
    }
}
