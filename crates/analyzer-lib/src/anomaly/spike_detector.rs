//! Transient CPU spike detection
//!
//! Hysteresis scanner over a sample series: an episode opens when the value
//! jumps from at or below the base threshold to at or above the spike
//! threshold, and closes the first time it falls back to the base threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Episode, PatternKind, SampleSeries};

/// Default "normal" level in percent
pub const DEFAULT_BASE_THRESHOLD: f64 = 20.0;

/// Default spike peak level in percent
pub const DEFAULT_SPIKE_THRESHOLD: f64 = 70.0;

/// Scanner state between samples
#[derive(Debug, Clone, Copy, PartialEq)]
enum SpikeState {
    Normal,
    InSpike { start: DateTime<Utc>, peak: f64 },
}

/// Detects low → high → low episodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeDetector {
    /// Values at or below this count as normal
    pub base_threshold: f64,
    /// Values at or above this count as a spike
    pub spike_threshold: f64,
}

impl SpikeDetector {
    pub fn new(base_threshold: f64, spike_threshold: f64) -> Self {
        Self {
            base_threshold,
            spike_threshold,
        }
    }

    /// Set the base ("normal") threshold
    pub fn with_base_threshold(mut self, base_threshold: f64) -> Self {
        self.base_threshold = base_threshold;
        self
    }

    /// Set the spike threshold
    pub fn with_spike_threshold(mut self, spike_threshold: f64) -> Self {
        self.spike_threshold = spike_threshold;
        self
    }

    /// Base must sit strictly below the spike level for hysteresis to hold
    pub fn is_valid(&self) -> bool {
        self.base_threshold.is_finite()
            && self.spike_threshold.is_finite()
            && self.base_threshold < self.spike_threshold
    }

    /// Scan a series and return every closed spike episode, oldest first
    ///
    /// A spike still open at the end of the series is dropped.
    pub fn detect(&self, series: &SampleSeries) -> Vec<Episode> {
        let mut episodes = Vec::new();
        let mut state = SpikeState::Normal;

        for pair in series.samples().windows(2) {
            let (prev, curr) = (pair[0], pair[1]);

            state = match state {
                SpikeState::Normal => {
                    if prev.value <= self.base_threshold && curr.value >= self.spike_threshold {
                        SpikeState::InSpike {
                            start: curr.timestamp,
                            peak: curr.value,
                        }
                    } else {
                        SpikeState::Normal
                    }
                }
                SpikeState::InSpike { start, peak } => {
                    if curr.value <= self.base_threshold {
                        episodes.push(self.episode(&series.instance, start, curr.timestamp, peak));
                        SpikeState::Normal
                    } else {
                        SpikeState::InSpike {
                            start,
                            peak: peak.max(curr.value),
                        }
                    }
                }
            };
        }

        episodes
    }

    fn episode(
        &self,
        instance: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        peak: f64,
    ) -> Episode {
        let kind = PatternKind::TransientSpike;
        Episode {
            instance: instance.to_string(),
            start,
            end,
            kind,
            severity: kind.severity(),
            observed_value: peak,
            details: format!(
                "Instance '{}' CPU usage spiked from ~{:.2}% to over {:.2}% (peak {:.2}%) and returned to normal.",
                instance, self.base_threshold, self.spike_threshold, peak
            ),
        }
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_THRESHOLD, DEFAULT_SPIKE_THRESHOLD)
    }
}
