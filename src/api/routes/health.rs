//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (ready to serve traffic)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Ready while the data directory is reachable.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.service.config().data_dir.is_dir() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status. Degraded while any index is unavailable.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (indexes, unavailable) = state.service.health().await;

    let status = if !state.service.config().data_dir.is_dir() {
        "unhealthy"
    } else if unavailable > 0 {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        indexes,
        unavailable_indexes: unavailable,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
