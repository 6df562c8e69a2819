use aiops_core::platform;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::middleware::rbac::RequireAuth;
use crate::state::AppState;

const SERVICE_NAME: &str = "aiops-agent";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    hostname: String,
    platform: &'static str,
    version: &'static str,
    status: &'static str,
}

/// GET /health -- liveness, no authentication.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

/// GET /status -- host snapshot for any authenticated caller.
async fn status(RequireAuth(_user): RequireAuth) -> Json<StatusResponse> {
    Json(StatusResponse {
        hostname: platform::hostname(),
        platform: platform::platform_name(),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}
