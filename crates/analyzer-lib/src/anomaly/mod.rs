//! Temporal pattern detection over CPU utilization series
//!
//! This module provides detection for:
//! - Transient spikes (low → high → low, two-threshold hysteresis)
//! - Sustained high load (latest sample at or above a threshold)
//! - Deduplication of reports for an ongoing condition

mod dedup;
mod spike_detector;
mod sustained_detector;

pub use dedup::{DedupKey, DedupPolicy, DEFAULT_COOLDOWN_SECS};
pub use spike_detector::{SpikeDetector, DEFAULT_BASE_THRESHOLD, DEFAULT_SPIKE_THRESHOLD};
pub use sustained_detector::{SustainedLoadDetector, SustainedOutcome, DEFAULT_LOAD_THRESHOLD};
