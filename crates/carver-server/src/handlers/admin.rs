//! Admin handlers.

use crate::auth::AuthenticatedCaller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Extension, State};
use serde::Serialize;

/// Response for a manually triggered cleanup sweep.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    /// Carves expired by this sweep.
    pub expired: u64,
    /// Per-carve failure descriptions; these carves will be retried on the
    /// next sweep.
    pub errors: Vec<String>,
}

/// POST /v1/admin/carves/cleanup
///
/// Runs one cleanup sweep immediately instead of waiting for the background
/// interval.
pub async fn trigger_cleanup(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedCaller>>,
) -> ApiResult<Json<CleanupResponse>> {
    caller
        .as_ref()
        .map(|Extension(c)| c)
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?
        .require_operator()?;

    let stats = state.service.cleanup().await?;
    Ok(Json(CleanupResponse {
        expired: stats.expired,
        errors: stats.errors,
    }))
}
