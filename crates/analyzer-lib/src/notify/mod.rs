//! Alert delivery to human-facing channels
//!
//! Sinks are best-effort: a failed delivery is logged by the sink itself and
//! never reaches the orchestrator, other sinks, or the persisted report.

mod email;
mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::models::Report;

pub use email::{EmailConfig, EmailSink};
pub use webhook::ChatWebhookSink;

/// Delivery channel for a finished report
#[async_trait]
pub trait NotifierSink: Send + Sync {
    /// Short channel name for logs
    fn name(&self) -> &str;

    /// Deliver a report, swallowing and logging any failure
    async fn deliver(&self, report: &Report);
}

/// Delivers each report to every configured sink
#[derive(Clone, Default)]
pub struct NotifierFanout {
    sinks: Vec<Arc<dyn NotifierSink>>,
}

impl NotifierFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the fan-out
    pub fn with_sink(mut self, sink: Arc<dyn NotifierSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn deliver(&self, report: &Report) {
        for sink in &self.sinks {
            debug!(sink = sink.name(), report_id = report.id, "Delivering report");
            sink.deliver(report).await;
        }
    }
}

/// Time window line shared by the mail and chat renderings
fn format_window(report: &Report) -> String {
    format!(
        "{} to {}",
        report.start_time.to_rfc2822(),
        report.end_time.to_rfc2822()
    )
}
