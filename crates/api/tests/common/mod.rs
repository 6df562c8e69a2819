#![allow(dead_code)]

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use aiops_api::auth::jwt::JwtConfig;
use aiops_api::auth::manager::SecurityManager;
use aiops_api::config::{LogFormat, ServerConfig};
use aiops_api::router::build_app_router;
use aiops_api::state::AppState;
use aiops_core::scripting::language::Language;

pub const TEST_JWT_SECRET: &str = "integration-test-signing-secret";
pub const TEST_AES_KEY: &str = "integration-test-aes-key";

/// Build a test `ServerConfig` with safe defaults and a short execution
/// ceiling.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            token_ttl: Duration::from_secs(3600),
        },
        aes_key: TEST_AES_KEY.to_string(),
        issuance_secret_hash: None,
        exec_timeout_secs: 30,
        max_output_bytes: 64 * 1024,
        temp_dir: std::env::temp_dir().join("aiops-agent-tests"),
        default_language: Language::Shell,
        log_format: LogFormat::Text,
    }
}

/// The full application router (same middleware stack as the binary) for
/// `config`, with the platform identity switcher.
pub fn build_app(config: ServerConfig) -> Router {
    let switcher = aiops_core::identity::detect().ok();
    let state = AppState::new(config.clone(), switcher);
    build_app_router(state, &config)
}

pub fn build_test_app() -> Router {
    build_app(test_config())
}

/// An access token signed with the test secret carrying `scopes`.
pub fn token(scopes: &[&str]) -> String {
    let config = test_config();
    let security = SecurityManager::new(config.jwt, &config.aes_key, None);
    let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
    security
        .issue_token("integration-tests", &scopes, None)
        .expect("token issuance should succeed")
}

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.expect("router is infallible")
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request");
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("valid request");
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request");
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .expect("valid request");
    send(app, request).await
}

/// POST a raw (possibly malformed) JSON body.
pub async fn post_raw_auth(app: Router, uri: &str, body: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .expect("valid request");
    send(app, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
