//! Route definitions for the `/auth` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /api-key  -> issue_api_key (public, optionally secret-gated)
/// POST /verify   -> verify (public)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api-key", post(auth::issue_api_key))
        .route("/verify", post(auth::verify))
}
