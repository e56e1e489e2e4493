//! Analysis orchestrator
//!
//! Runs one detector over every series of a query result. A failed query
//! aborts the run; a failed dedup lookup or insert only skips that instance.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{AnalysisConfig, AnalysisError, AnalysisKind, ConfigError};
use crate::anomaly::{SpikeDetector, SustainedLoadDetector, SustainedOutcome};
use crate::health::{components, HealthRegistry};
use crate::models::{Episode, NewReport, SampleSeries};
use crate::notify::NotifierFanout;
use crate::observability::{AnalyzerMetrics, StructuredLogger};
use crate::query::{QueryExecutor, QueryRange};
use crate::store::{ReportStore, StoreError};

/// Counts from one completed analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub kind: AnalysisKind,
    /// Series returned by the query
    pub series: usize,
    pub episodes: usize,
    pub reports_created: usize,
    /// Findings skipped because an existing report already covers them
    pub suppressed: usize,
    /// Instances skipped after a store failure
    pub failed: usize,
}

impl RunSummary {
    fn new(kind: AnalysisKind, series: usize) -> Self {
        Self {
            kind,
            series,
            episodes: 0,
            reports_created: 0,
            suppressed: 0,
            failed: 0,
        }
    }
}

/// Runs detectors over query results and reports what they find
pub struct AnalysisOrchestrator {
    query: Arc<dyn QueryExecutor>,
    store: Arc<dyn ReportStore>,
    notifier: NotifierFanout,
    config: AnalysisConfig,
    spike_detector: SpikeDetector,
    sustained_detector: SustainedLoadDetector,
    health: HealthRegistry,
    metrics: AnalyzerMetrics,
    logger: StructuredLogger,
}

impl AnalysisOrchestrator {
    pub fn new(
        query: Arc<dyn QueryExecutor>,
        store: Arc<dyn ReportStore>,
        notifier: NotifierFanout,
        config: AnalysisConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            query,
            store,
            notifier,
            spike_detector: config.spike_detector(),
            sustained_detector: config.sustained_detector(),
            config,
            health: HealthRegistry::new(),
            metrics: AnalyzerMetrics::new(),
            logger: StructuredLogger::new("pattern-analyzer"),
        })
    }

    /// Report collaborator health into a shared registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Transient spike analysis over the spike window
    pub async fn run_spike_analysis(&self) -> Result<RunSummary, AnalysisError> {
        self.run(AnalysisKind::Spike).await
    }

    /// Sustained high load analysis over the sustained window
    pub async fn run_sustained_load_analysis(&self) -> Result<RunSummary, AnalysisError> {
        self.run(AnalysisKind::SustainedLoad).await
    }

    pub async fn run(&self, kind: AnalysisKind) -> Result<RunSummary, AnalysisError> {
        self.run_at(kind, Utc::now()).await
    }

    /// Run `kind` with `now` as the end of the query window and dedup clock
    pub async fn run_at(
        &self,
        kind: AnalysisKind,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, AnalysisError> {
        let started = Instant::now();
        info!(analysis = %kind, "Running analysis");

        let window = self.config.window(kind);
        let range = QueryRange::lookback(now, window.lookback, window.step);

        let result = match self.query.query_range(&self.config.query, range).await {
            Ok(result) => {
                self.health.record_success(components::QUERY_BACKEND).await;
                result
            }
            Err(e) => {
                error!(analysis = %kind, error = %e, "Range query failed, aborting analysis");
                self.metrics.inc_query_errors();
                self.health
                    .record_failure(components::QUERY_BACKEND, e.to_string())
                    .await;
                self.metrics
                    .observe_run(kind.as_str(), "failed", started.elapsed().as_secs_f64());
                return Err(AnalysisError::Query { kind, source: e });
            }
        };

        let mut summary = RunSummary::new(kind, result.series.len());
        for series in &result.series {
            match kind {
                AnalysisKind::Spike => self.analyze_spikes(series, &mut summary).await,
                AnalysisKind::SustainedLoad => {
                    self.analyze_sustained(series, now, &mut summary).await
                }
            }
        }

        self.metrics
            .observe_run(kind.as_str(), "success", started.elapsed().as_secs_f64());
        self.logger.log_run_finished(
            kind.as_str(),
            summary.series,
            summary.episodes,
            summary.reports_created,
            summary.suppressed,
            summary.failed,
        );

        Ok(summary)
    }

    async fn analyze_spikes(&self, series: &SampleSeries, summary: &mut RunSummary) {
        let episodes = self.spike_detector.detect(series);
        debug!(instance = %series.instance, episodes = episodes.len(), "Spike scan complete");

        for episode in episodes {
            let metric = episode.kind.metric_name();
            match self
                .store
                .episode_exists(metric, &episode.instance, episode.start, episode.end)
                .await
            {
                Ok(true) => {
                    summary.suppressed += 1;
                    self.metrics.inc_alerts_suppressed(metric);
                    self.logger
                        .log_alert_suppressed(metric, &episode.instance, episode.observed_value);
                }
                Ok(false) => self.report(&episode, summary).await,
                Err(e) => {
                    warn!(
                        instance = %episode.instance,
                        error = %e,
                        "Spike report lookup failed, skipping episode"
                    );
                    self.store_failed(e, summary).await;
                }
            }
        }
    }

    async fn analyze_sustained(
        &self,
        series: &SampleSeries,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) {
        match self
            .sustained_detector
            .detect(series, self.store.as_ref(), now)
            .await
        {
            Ok(SustainedOutcome::Normal) => {}
            Ok(SustainedOutcome::Suppressed { instance, value }) => {
                let metric = crate::models::PatternKind::SustainedHighLoad.metric_name();
                summary.suppressed += 1;
                self.metrics.inc_alerts_suppressed(metric);
                self.logger.log_alert_suppressed(metric, &instance, value);
            }
            Ok(SustainedOutcome::Detected(episode)) => self.report(&episode, summary).await,
            Err(e) => {
                warn!(
                    instance = %series.instance,
                    error = %e,
                    "Recent report lookup failed, skipping instance"
                );
                self.store_failed(e, summary).await;
            }
        }
    }

    /// Persist an episode as a report and dispatch it once stored
    async fn report(&self, episode: &Episode, summary: &mut RunSummary) {
        summary.episodes += 1;
        self.metrics.inc_episodes(episode.kind.metric_name(), 1);

        match self.store.insert(NewReport::from(episode)).await {
            Ok(report) => {
                self.health.record_success(components::REPORT_STORE).await;
                summary.reports_created += 1;
                self.metrics
                    .inc_reports_created(&report.metric_name, &report.severity.to_string());
                self.logger.log_report_created(&report);
                self.notifier.deliver(&report).await;
            }
            Err(e) => {
                error!(
                    instance = %episode.instance,
                    metric = episode.kind.metric_name(),
                    error = %e,
                    "Failed to save report, skipping instance"
                );
                self.store_failed(e, summary).await;
            }
        }
    }

    async fn store_failed(&self, e: StoreError, summary: &mut RunSummary) {
        summary.failed += 1;
        self.metrics.inc_store_errors();
        self.health
            .record_failure(components::REPORT_STORE, e.to_string())
            .await;
    }
}
