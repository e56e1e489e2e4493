//! CPU pattern analysis library
//!
//! This crate provides the core functionality for:
//! - Range queries against a Prometheus-compatible backend
//! - Transient spike and sustained high load detection
//! - Report persistence with cooldown-based alert deduplication
//! - Notification fan-out to chat and mail sinks
//! - Scheduled and on-demand analysis runs
//! - Health checks and observability

pub mod analysis;
pub mod anomaly;
pub mod health;
pub mod models;
pub mod notify;
pub mod observability;
pub mod query;
pub mod store;

pub use analysis::{
    AnalysisConfig, AnalysisKind, AnalysisOrchestrator, AnalysisScheduler, AnalysisTrigger,
    CronSchedule, RunSummary, TriggerAck,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AnalyzerMetrics, StructuredLogger};
pub use store::{MemoryReportStore, ReportStore, SqliteReportStore};
