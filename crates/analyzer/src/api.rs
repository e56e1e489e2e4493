//! HTTP API for health checks, metrics, report history and on-demand runs

use analyzer_lib::{
    analysis::{AnalysisKind, AnalysisTrigger},
    health::{ComponentStatus, HealthRegistry},
    store::ReportStore,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub trigger: AnalysisTrigger,
    pub store: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        trigger: AnalysisTrigger,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            health_registry,
            trigger,
            store,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Report history, newest first
async fn list_reports(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_all().await {
        Ok(reports) => Json(reports).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list reports");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to list reports" })),
            )
                .into_response()
        }
    }
}

async fn analyze_spike(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(state.trigger.trigger(AnalysisKind::Spike)),
    )
}

async fn analyze_high_load(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(state.trigger.trigger(AnalysisKind::SustainedLoad)),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/reports", get(list_reports))
        .route("/api/analyze/cpu-spike", post(analyze_spike))
        .route("/api/analyze/cpu-high-load", post(analyze_high_load))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_lib::{
        analysis::{AnalysisConfig, AnalysisOrchestrator},
        health::components,
        models::{NewReport, QueryResult, Severity},
        notify::NotifierFanout,
        query::{QueryError, QueryExecutor, QueryRange},
        store::MemoryReportStore,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    struct EmptyQuery;

    #[async_trait]
    impl QueryExecutor for EmptyQuery {
        async fn query_range(
            &self,
            _expr: &str,
            _range: QueryRange,
        ) -> Result<QueryResult, QueryError> {
            Ok(QueryResult::default())
        }
    }

    fn test_state(store: Arc<MemoryReportStore>) -> (Arc<AppState>, HealthRegistry) {
        let health = HealthRegistry::new();
        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(EmptyQuery),
            store.clone(),
            NotifierFanout::new(),
            AnalysisConfig::default(),
        )
        .unwrap();
        let trigger = AnalysisTrigger::new(Arc::new(orchestrator));
        (
            Arc::new(AppState::new(health.clone(), trigger, store)),
            health,
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn report(instance: &str) -> NewReport {
        let now = Utc::now();
        NewReport {
            metric_name: "cpu_sustained_high".to_string(),
            pattern_detected: "Sustained High CPU Load".to_string(),
            severity: Severity::Critical,
            instance: instance.to_string(),
            start_time: now,
            end_time: now,
            details: format!("Instance '{}' is under sustained high CPU load", instance),
        }
    }

    #[tokio::test]
    async fn test_healthz_endpoint_healthy() {
        let (state, health) = test_state(Arc::new(MemoryReportStore::new()));
        health.register(components::QUERY_BACKEND).await;

        let response = create_router(state)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_healthz_backend_outage_is_degraded() {
        let (state, health) = test_state(Arc::new(MemoryReportStore::new()));
        health.set_ready(true).await;
        for _ in 0..5 {
            health
                .record_failure(components::QUERY_BACKEND, "connection refused")
                .await;
        }
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "degraded");

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_endpoint_unhealthy() {
        let (state, health) = test_state(Arc::new(MemoryReportStore::new()));
        for _ in 0..3 {
            health
                .record_failure(components::SCHEDULER, "schedule exhausted")
                .await;
        }

        let response = create_router(state)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_endpoint() {
        let (state, health) = test_state(Arc::new(MemoryReportStore::new()));
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        health.set_ready(true).await;
        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, _health) = test_state(Arc::new(MemoryReportStore::new()));

        let response = create_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_list_reports_newest_first() {
        let store = Arc::new(MemoryReportStore::new());
        store.insert(report("host-1")).await.unwrap();
        store.insert(report("host-2")).await.unwrap();
        let (state, _health) = test_state(store);

        let response = create_router(state)
            .oneshot(Request::builder().uri("/api/reports").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let reports = body.as_array().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0]["instance"], "host-2");
        assert_eq!(reports[0]["severity"], "critical");
        assert!(reports[0]["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_trigger_endpoints_accept() {
        let (state, _health) = test_state(Arc::new(MemoryReportStore::new()));
        let app = create_router(state);

        for (uri, kind) in [
            ("/api/analyze/cpu-spike", "spike"),
            ("/api/analyze/cpu-high-load", "sustained_load"),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED);
            let body = body_json(response).await;
            assert_eq!(body["kind"], kind);
            assert!(body["message"].as_str().unwrap().contains("triggered"));
        }
    }

    #[tokio::test]
    async fn test_trigger_requires_post() {
        let (state, _health) = test_state(Arc::new(MemoryReportStore::new()));

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/analyze/cpu-spike")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
