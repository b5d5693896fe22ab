//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::{health, metrics};

use crate::response::{HealthResponse, LivenessResponse};
use crate::state::AppState;

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = health().report();

    Json(HealthResponse {
        status: format!("{:?}", report.status).to_lowercase(),
        broker_connected: state.broker.is_connected(),
        broker_state: state.broker.state().as_str().to_string(),
        audit_connected: health().audit.is_healthy(),
        in_flight: metrics().in_flight.get(),
    })
}

/// GET /health/ready - Ready only while events can flow in.
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.broker.is_connected() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - The process is up; broker loss alone does not fail it.
pub async fn live_handler(State(state): State<AppState>) -> (StatusCode, Json<LivenessResponse>) {
    let alive = health().is_alive();
    let status = if alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(LivenessResponse {
            alive,
            broker_connected: state.broker.is_connected(),
        }),
    )
}
