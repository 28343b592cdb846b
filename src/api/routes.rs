//! API Routes
//!
//! HTTP endpoints for health checks, the last cycle report and telemetry

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::Telemetry;
use crate::controller::SharedFleetState;
use crate::types::HostStatus;

/// Shared API state
pub struct ApiState {
    pub fleet: SharedFleetState,
    pub telemetry: Arc<Telemetry>,
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/report", get(get_report))

        // Telemetry
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_api_server(
    port: u16,
    fleet: SharedFleetState,
    telemetry: Arc<Telemetry>,
) -> anyhow::Result<()> {
    let app = router(Arc::new(ApiState { fleet, telemetry }));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("📊 HTTP API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Fleet summary of the last cycle
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let fleet = state.fleet.read().await;

    let tables: serde_json::Map<String, serde_json::Value> = fleet
        .last_report
        .iter()
        .flat_map(|report| report.tables.values())
        .map(|t| {
            (
                t.table.to_string(),
                serde_json::json!({
                    "hosts": t.hosts.len(),
                    "failed": t.errors.len(),
                    "healthy": t.healthy(),
                    "green": t.count(HostStatus::Green),
                    "yellow": t.count(HostStatus::Yellow),
                    "red": t.count(HostStatus::Red),
                }),
            )
        })
        .collect();

    let report = fleet.last_report.as_ref();
    let status = serde_json::json!({
        "status": if fleet.last_error.is_none() { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.telemetry.uptime_secs(),
        "active_tables": fleet.active_tables,
        "last_error": fleet.last_error,
        "last_cycle": report.map(|r| r.finished_at),
        "reference": report.map(|r| r.reference.to_string()),
        "reference_gas_price": report.and_then(|r| r.reference_gas_price),
        "gas": report.and_then(|r| r.gas),
        "tables": tables,
    });

    Json(status)
}

/// GET /report - Full report of the last cycle
async fn get_report(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let fleet = state.fleet.read().await;

    match fleet.last_report.as_ref().map(serde_json::to_value) {
        Some(Ok(report)) => (StatusCode::OK, Json(report)),
        Some(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no cycle completed yet" })),
        ),
    }
}

/// GET /metrics - Prometheus format telemetry
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.telemetry.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format telemetry
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.telemetry.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    use crate::controller::FleetState;
    use crate::types::TableType;

    fn app() -> Router {
        router(Arc::new(ApiState {
            fleet: Arc::new(RwLock::new(FleetState::new(TableType::ALL))),
            telemetry: Arc::new(Telemetry::new()),
        }))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(get(app(), "/health").await, (StatusCode::OK, "OK".to_string()));
    }

    #[tokio::test]
    async fn test_status_before_first_cycle() {
        let (status, body) = get(app(), "/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_tables"], serde_json::json!(["rpc", "node", "validator"]));
        assert!(json["reference"].is_null());
    }

    #[tokio::test]
    async fn test_report_unavailable_before_first_cycle() {
        let (status, _) = get(app(), "/report").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_prometheus_endpoint() {
        let (status, body) = get(app(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("fleet_monitor_cycles_total 0"));
    }
}
