//! Scheduled and on-demand analysis runs
//!
//! Both sources hand runs to their own tasks, so neither the scheduler's
//! timer nor an on-demand caller waits for an analysis to finish. Runs of
//! the same kind may overlap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{AnalysisKind, AnalysisOrchestrator, CronSchedule, RunSummary};
use crate::health::{components, HealthRegistry};

/// Run each kind in order, logging failures and moving on
pub async fn run_tick(orchestrator: &AnalysisOrchestrator, kinds: &[AnalysisKind]) -> Vec<RunSummary> {
    let mut summaries = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        match orchestrator.run(kind).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(analysis = %kind, error = %e, "Scheduled analysis failed"),
        }
    }
    summaries
}

/// Fires configured analyses on a cron schedule
pub struct AnalysisScheduler {
    orchestrator: Arc<AnalysisOrchestrator>,
    schedule: CronSchedule,
    kinds: Vec<AnalysisKind>,
    health: HealthRegistry,
}

impl AnalysisScheduler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, schedule: CronSchedule) -> Self {
        Self {
            orchestrator,
            schedule,
            kinds: AnalysisKind::ALL.to_vec(),
            health: HealthRegistry::new(),
        }
    }

    /// Restrict which analyses a tick runs
    pub fn with_kinds(mut self, kinds: Vec<AnalysisKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Run the timer loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(schedule = %self.schedule, kinds = ?self.kinds, "Starting analysis scheduler");
        self.health.record_success(components::SCHEDULER).await;

        // Never fire the same instant twice, even if the sleep wakes early
        let mut after = Utc::now();
        loop {
            let Some(next) = self.schedule.next_after(after) else {
                error!(schedule = %self.schedule, "Schedule has no next firing, stopping scheduler");
                self.health
                    .record_failure(components::SCHEDULER, "schedule exhausted")
                    .await;
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!(fired_at = %next, "Scheduled analysis tick");
                    self.spawn_tick();
                    after = next.max(Utc::now());
                }
                _ = shutdown.recv() => {
                    info!("Shutting down analysis scheduler");
                    break;
                }
            }
        }
    }

    /// Start one tick on its own task
    pub fn spawn_tick(&self) -> JoinHandle<Vec<RunSummary>> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let kinds = self.kinds.clone();
        tokio::spawn(async move { run_tick(&orchestrator, &kinds).await })
    }
}

/// Acknowledgement returned to an on-demand caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerAck {
    pub kind: AnalysisKind,
    pub message: String,
    pub accepted_at: DateTime<Utc>,
}

/// Starts single runs on request without waiting for them
#[derive(Clone)]
pub struct AnalysisTrigger {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl AnalysisTrigger {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn trigger(&self, kind: AnalysisKind) -> TriggerAck {
        self.trigger_with_handle(kind).0
    }

    /// Like [`trigger`](Self::trigger), also returning the run's task handle
    pub fn trigger_with_handle(&self, kind: AnalysisKind) -> (TriggerAck, JoinHandle<()>) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let handle = tokio::spawn(async move {
            if let Err(e) = orchestrator.run(kind).await {
                warn!(analysis = %kind, error = %e, "On-demand analysis failed");
            }
        });

        info!(analysis = %kind, "On-demand analysis accepted");
        let ack = TriggerAck {
            kind,
            message: format!("{} analysis has been triggered in the background", describe(kind)),
            accepted_at: Utc::now(),
        };
        (ack, handle)
    }
}

fn describe(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Spike => "CPU spike",
        AnalysisKind::SustainedLoad => "CPU high load",
    }
}
