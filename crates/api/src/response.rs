//! Response bodies for the operational endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway::BreakerMetrics;
use serde::{Deserialize, Serialize};
use telemetry::MetricsSnapshot;

/// GET /health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub broker_connected: bool,
    pub broker_state: String,
    pub audit_connected: bool,
    pub in_flight: u64,
}

/// GET /health/live
#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub broker_connected: bool,
}

/// GET /metrics
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub dispatcher: MetricsSnapshot,
    pub circuit_breakers: Vec<BreakerMetrics>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error with a stable code.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse {
                error: msg.into(),
                code: code.into(),
            },
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}
