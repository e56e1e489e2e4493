//! Health tracking for the analyzer's collaborators
//!
//! Analysis runs report the outcome of each boundary call here. A single
//! failure marks the component degraded. Repeated consecutive failures of the
//! analyzer's own components mark them unhealthy, which also takes the service
//! out of readiness; outages of external collaborators (the query backend and
//! the report store) never go past degraded, since restarting the analyzer
//! cannot fix them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failures after which an internal component is unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

/// Last known health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consecutive_failures: u32,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check: Utc::now(),
        }
    }

    fn failed(previous_failures: u32, message: String, external: bool) -> Self {
        let consecutive_failures = previous_failures + 1;
        let status = if !external && consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        Self {
            status,
            message: Some(message),
            consecutive_failures,
            last_check: Utc::now(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SCHEDULER: &str = "scheduler";
    pub const QUERY_BACKEND: &str = "query_backend";
    pub const REPORT_STORE: &str = "report_store";

    /// Collaborators outside the analyzer; their failures cap at degraded
    pub const EXTERNAL: &[&str] = &[QUERY_BACKEND, REPORT_STORE];

    pub fn is_external(name: &str) -> bool {
        EXTERNAL.contains(&name)
    }
}

/// Shared registry of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// A boundary call to `name` succeeded
    pub async fn record_success(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// A boundary call to `name` failed
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut components = self.components.write().await;
        let previous = components
            .get(name)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0);
        components.insert(
            name.to_string(),
            ComponentHealth::failed(previous, message.into(), components::is_external(name)),
        );
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Analyzer not yet initialized".to_string())
        } else if !health.status.is_operational() {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
