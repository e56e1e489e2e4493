//! Pattern Analyzer - CPU pattern detection service
//!
//! Queries Prometheus on a cron schedule (and on demand over HTTP), detects
//! transient spikes and sustained high load per instance, and stores and
//! dispatches deduplicated reports.

use analyzer_lib::{
    analysis::{AnalysisOrchestrator, AnalysisScheduler, AnalysisTrigger},
    health::{components, HealthRegistry},
    observability::{AnalyzerMetrics, StructuredLogger},
    query::PrometheusClient,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVICE_NAME: &str = "pattern-analyzer";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pattern-analyzer");

    // Load configuration
    let config = config::AnalyzerConfig::load()?;
    let schedule = config.cron_schedule()?;
    info!(
        prometheus_url = %config.prometheus_url,
        schedule = %schedule,
        "Analyzer configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::QUERY_BACKEND).await;
    health_registry.register(components::REPORT_STORE).await;

    // Register metrics before the first scrape
    let _metrics = AnalyzerMetrics::new();

    let logger = StructuredLogger::new(SERVICE_NAME);
    logger.log_startup(ANALYZER_VERSION, &schedule.to_string());

    // Collaborators
    let query = PrometheusClient::new(&config.prometheus_url, config.query_timeout())?;
    let store = config.build_store().await?;
    let notifier = config.build_notifier()?;
    if notifier.is_empty() {
        warn!("No notifier sinks configured, reports will only be stored");
    } else {
        info!(sinks = ?notifier.sink_names(), "Notifier sinks configured");
    }

    let orchestrator = Arc::new(
        AnalysisOrchestrator::new(Arc::new(query), store.clone(), notifier, config.analysis())?
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );

    // Start the scheduler
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = Arc::new(
        AnalysisScheduler::new(Arc::clone(&orchestrator), schedule)
            .with_health(health_registry.clone()),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        AnalysisTrigger::new(orchestrator),
        store,
    ));

    // Mark analyzer as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics and trigger server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal or a failed API server
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    info!("Shutting down");

    Ok(())
}
