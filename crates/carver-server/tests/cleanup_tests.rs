//! Integration tests for the retention sweep over the HTTP API.

mod common;

use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::{AGENT_TOKEN, OPERATOR_TOKEN, TestServer, json_request};
use serde_json::json;

async fn begin_carve(server: &TestServer, request_id: &str) -> (i64, String) {
    let body = json!({
        "block_count": 2,
        "block_size": 4,
        "carve_size": 8,
        "carve_id": format!("carve-{request_id}"),
        "request_id": request_id,
    });
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/carves/begin",
        Some(body),
        Some(AGENT_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["carve"]["id"].as_i64().unwrap(),
        body["session_id"].as_str().unwrap().to_string(),
    )
}

async fn upload(server: &TestServer, session: &str, request_id: &str, block_id: i64) -> StatusCode {
    let body = json!({
        "session_id": session,
        "request_id": request_id,
        "block_id": block_id,
        "data": BASE64.encode(b"xxxx"),
    });
    let (status, _) =
        json_request(&server.router, "POST", "/v1/carves/blocks", Some(body), None).await;
    status
}

#[tokio::test]
async fn test_sweep_expires_only_stale_carves() {
    let server = TestServer::new().await;

    let (stale_id, stale_session) = begin_carve(&server, "stale").await;
    assert_eq!(upload(&server, &stale_session, "stale", 0).await, StatusCode::OK);
    server.backdate_carve(stale_id, 25).await;

    let (fresh_id, fresh_session) = begin_carve(&server, "fresh").await;
    assert_eq!(upload(&server, &fresh_session, "fresh", 0).await, StatusCode::OK);
    server.backdate_carve(fresh_id, 1).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/admin/carves/cleanup",
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"].as_u64(), Some(1));

    // Metadata survives for audit, in the expired state.
    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("/v1/carves/{stale_id}"),
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"].as_str(), Some("expired"));
    assert_eq!(body["expired"].as_bool(), Some(true));

    // Block data is gone, so reads report absence while uploads are refused.
    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("/v1/carves/{stale_id}/blocks/0"),
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(
        upload(&server, &stale_session, "stale", 1).await,
        StatusCode::GONE
    );

    // The fresh carve keeps working.
    let (status, _) = json_request(
        &server.router,
        "GET",
        &format!("/v1/carves/{fresh_id}/blocks/0"),
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        upload(&server, &fresh_session, "fresh", 1).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_listing_hides_expired_by_default() {
    let server = TestServer::new().await;

    let (stale_id, _) = begin_carve(&server, "old").await;
    server.backdate_carve(stale_id, 25).await;
    begin_carve(&server, "new").await;

    json_request(
        &server.router,
        "POST",
        "/v1/admin/carves/cleanup",
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;

    let (status, body) = json_request(
        &server.router,
        "GET",
        "/v1/carves",
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["carves"].as_array().unwrap().len(), 1);

    let (status, body) = json_request(
        &server.router,
        "GET",
        "/v1/carves?expired=true",
        None,
        Some(OPERATOR_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["carves"].as_array().unwrap().len(), 2);
}
