//! Integration tests for the health and status endpoints and general HTTP
//! behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, get_auth, token};

#[tokio::test]
async fn health_needs_no_token() {
    let response = get(common::build_test_app(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "aiops-agent");
}

#[tokio::test]
async fn status_requires_a_token() {
    let response = get(common::build_test_app(), "/status").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_reports_host_snapshot() {
    let response = get_auth(common::build_test_app(), "/status", &token(&[])).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    assert_eq!(json["platform"], std::env::consts::OS);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["hostname"].as_str().is_some_and(|h| !h.is_empty()));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let response = get(common::build_test_app(), "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let response = get(common::build_test_app(), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("response must carry x-request-id");
    let id = request_id.to_str().expect("ascii header");
    assert_eq!(id.len(), 36, "x-request-id should be a UUID string");
}
