//! Shared handlers.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /v1/health
///
/// Intentionally unauthenticated for load balancer and orchestrator probes.
/// Reports unhealthy when the metadata store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.service.store().health_check().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}
