//! Liveness endpoint for monitoring and load balancers

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// "degraded" once any audit record could not be written
    pub audit_status: &'static str,
    /// "degraded" once any metric could not be recorded
    pub metrics_status: &'static str,
}

fn status_of(failures: u64) -> &'static str {
    if failures > 0 { "degraded" } else { "operational" }
}

/// Always 200 while the process serves requests; the sub-statuses surface
/// bookkeeping failures that never fail an operation
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let metrics = state.metrics();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            audit_status: status_of(metrics.audit_failures_count()),
            metrics_status: status_of(metrics.metrics_recording_failures_count()),
        }),
    )
}
