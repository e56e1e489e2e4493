//! Observability infrastructure for the analyzer
//!
//! Provides:
//! - Prometheus metrics (run latency, run outcomes, episodes, reports, suppressions)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::Report;

/// Histogram buckets for analysis run latency (in seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalyzerMetricsInner> = OnceLock::new();

struct AnalyzerMetricsInner {
    run_latency_seconds: HistogramVec,
    runs: IntCounterVec,
    episodes_detected: IntCounterVec,
    reports_created: IntCounterVec,
    alerts_suppressed: IntCounterVec,
    query_errors: IntCounter,
    store_errors: IntCounter,
}

impl AnalyzerMetricsInner {
    fn new() -> Self {
        Self {
            run_latency_seconds: register_histogram_vec!(
                "pattern_analyzer_run_latency_seconds",
                "Wall time of one analysis run",
                &["analysis"],
                RUN_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register run_latency_seconds"),

            runs: register_int_counter_vec!(
                "pattern_analyzer_runs_total",
                "Analysis runs by outcome",
                &["analysis", "outcome"]
            )
            .expect("Failed to register runs_total"),

            episodes_detected: register_int_counter_vec!(
                "pattern_analyzer_episodes_detected_total",
                "Episodes produced by detectors",
                &["metric"]
            )
            .expect("Failed to register episodes_detected_total"),

            reports_created: register_int_counter_vec!(
                "pattern_analyzer_reports_created_total",
                "Reports persisted to the store",
                &["metric", "severity"]
            )
            .expect("Failed to register reports_created_total"),

            alerts_suppressed: register_int_counter_vec!(
                "pattern_analyzer_alerts_suppressed_total",
                "High-load findings suppressed by the dedup cooldown",
                &["metric"]
            )
            .expect("Failed to register alerts_suppressed_total"),

            query_errors: register_int_counter!(
                "pattern_analyzer_query_errors_total",
                "Failed range queries against the metrics backend"
            )
            .expect("Failed to register query_errors_total"),

            store_errors: register_int_counter!(
                "pattern_analyzer_store_errors_total",
                "Failed report store reads or writes"
            )
            .expect("Failed to register store_errors_total"),
        }
    }
}

/// Analyzer metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    _private: (),
}

impl Default for AnalyzerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerMetrics {
    /// Create a metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalyzerMetricsInner {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new)
    }

    pub fn observe_run(&self, analysis: &str, outcome: &str, duration_secs: f64) {
        let inner = self.inner();
        inner
            .run_latency_seconds
            .with_label_values(&[analysis])
            .observe(duration_secs);
        inner.runs.with_label_values(&[analysis, outcome]).inc();
    }

    pub fn inc_episodes(&self, metric: &str, count: u64) {
        self.inner()
            .episodes_detected
            .with_label_values(&[metric])
            .inc_by(count);
    }

    pub fn inc_reports_created(&self, metric: &str, severity: &str) {
        self.inner()
            .reports_created
            .with_label_values(&[metric, severity])
            .inc();
    }

    pub fn inc_alerts_suppressed(&self, metric: &str) {
        self.inner()
            .alerts_suppressed
            .with_label_values(&[metric])
            .inc();
    }

    pub fn inc_query_errors(&self) {
        self.inner().query_errors.inc();
    }

    pub fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }
}

/// Structured logger for analyzer events
///
/// Emits event-tagged records so log pipelines can filter on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, schedule: &str) {
        info!(
            event = "analyzer_started",
            service = %self.service,
            version = %version,
            schedule = %schedule,
            "Pattern analyzer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "analyzer_shutdown",
            service = %self.service,
            reason = %reason,
            "Pattern analyzer shutting down"
        );
    }

    pub fn log_report_created(&self, report: &Report) {
        warn!(
            event = "report_created",
            service = %self.service,
            report_id = report.id,
            metric = %report.metric_name,
            pattern = %report.pattern_detected,
            severity = %report.severity,
            instance = %report.instance,
            start_time = %report.start_time,
            end_time = %report.end_time,
            "Detected {} on instance {}",
            report.pattern_detected,
            report.instance
        );
    }

    pub fn log_alert_suppressed(&self, metric: &str, instance: &str, value: f64) {
        info!(
            event = "alert_suppressed",
            service = %self.service,
            metric = %metric,
            instance = %instance,
            value = value,
            "Condition on {} is ongoing but was reported recently, suppressing new alert",
            instance
        );
    }

    pub fn log_run_finished(
        &self,
        analysis: &str,
        series: usize,
        episodes: usize,
        reports_created: usize,
        suppressed: usize,
        failed: usize,
    ) {
        info!(
            event = "analysis_finished",
            service = %self.service,
            analysis = %analysis,
            series = series,
            episodes = episodes,
            reports_created = reports_created,
            suppressed = suppressed,
            failed = failed,
            "Analysis run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzer_metrics_creation() {
        // Global registry: handles created repeatedly share one registration
        let metrics = AnalyzerMetrics::new();
        let again = AnalyzerMetrics::new();

        metrics.observe_run("spike", "success", 0.2);
        metrics.inc_episodes("cpu_transient_spike", 2);
        metrics.inc_reports_created("cpu_transient_spike", "warning");
        again.inc_alerts_suppressed("cpu_sustained_high");
        again.inc_query_errors();
        again.inc_store_errors();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("pattern-analyzer");
        assert_eq!(logger.service, "pattern-analyzer");
    }
}
