//! Common test utilities and fixtures.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use carver_core::config::AppConfig;
use carver_metadata::{BlockBackend, SqliteCarveStore};
use carver_server::{AppState, create_router};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

/// Raw operator token matching the hash in `AppConfig::for_testing`.
pub const OPERATOR_TOKEN: &str = "test-operator-token";
/// Raw agent token (host 1) matching the hash in `AppConfig::for_testing`.
pub const AGENT_TOKEN: &str = "test-agent-token";

/// A fully wired server instance over a temp database.
pub struct TestServer {
    pub router: Router,
    pool: Pool<Sqlite>,
    _temp: TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let store = SqliteCarveStore::new(temp.path().join("carver.db"), BlockBackend::Database)
            .await
            .expect("Failed to create store");
        let pool = store.pool().clone();

        let state = AppState::new(AppConfig::for_testing(), Arc::new(store));
        Self {
            router: create_router(state),
            pool,
            _temp: temp,
        }
    }

    /// Rewrite a carve's creation time so the sweep treats it as stale.
    pub async fn backdate_carve(&self, carve_id: i64, hours: i64) {
        sqlx::query("UPDATE carves SET created_at = ? WHERE id = ?")
            .bind(OffsetDateTime::now_utc() - time::Duration::hours(hours))
            .bind(carve_id)
            .execute(&self.pool)
            .await
            .expect("Backdate failed");
    }
}

/// Helper to make JSON requests.
pub async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
