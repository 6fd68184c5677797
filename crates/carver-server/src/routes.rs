//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/v1/health", get(handlers::health_check))
        // Carve protocol
        .route("/v1/carves/begin", post(handlers::begin_carve))
        // Block uploads authenticate via the session id in the payload
        .route("/v1/carves/blocks", post(handlers::upload_block))
        // Operator read plane
        .route("/v1/carves", get(handlers::list_carves))
        .route("/v1/carves/{carve_id}", get(handlers::get_carve))
        .route(
            "/v1/carves/by-name/{name}",
            get(handlers::get_carve_by_name),
        )
        .route(
            "/v1/carves/{carve_id}/blocks/{block_id}",
            get(handlers::get_block),
        )
        // Admin
        .route("/v1/admin/carves/cleanup", post(handlers::trigger_cleanup));

    // Middleware layers apply in reverse order: TraceLayer -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
