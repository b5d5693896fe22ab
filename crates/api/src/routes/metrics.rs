//! Metrics and circuit breaker endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use gateway::BreakerMetrics;
use tracing::warn;

use crate::response::{ApiError, MetricsResponse};
use crate::state::AppState;

/// GET /metrics - Dispatcher counters plus every breaker's snapshot.
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        dispatcher: telemetry::metrics().snapshot(),
        circuit_breakers: state.breakers.iter().map(|b| b.metrics()).collect(),
    })
}

/// POST /circuit-breakers/:name/reset - Operator override to close a circuit.
pub async fn reset_breaker_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerMetrics>, ApiError> {
    let breaker = state
        .breaker(&name)
        .ok_or_else(|| ApiError::not_found(format!("unknown circuit breaker: {}", name)))?;

    warn!(breaker = %name, "Circuit breaker reset by operator");
    breaker.reset();
    Ok(Json(breaker.metrics()))
}
