pub mod auth;
pub mod exec;
pub mod health;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Build the agent's API route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/api-key                 issue API key + token (public)
/// /auth/verify                  verify API key + token (public)
///
/// /exec/command                 run a command (execute)
/// /exec/script/content          run inline script (execute)
/// /exec/script/file             run script on disk (execute)
/// /exec/script/dynamic          run generated script (execute)
///
/// /users                        list local accounts (read)
/// /users/{name}                 account detail (read)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/exec", exec::router())
        .nest("/users", users::router())
}
