//! Route definitions for the `/exec` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::exec;
use crate::state::AppState;

/// Routes mounted at `/exec`. All require the `execute` scope.
///
/// ```text
/// POST /command          -> run_command
/// POST /script/content   -> run_script_content
/// POST /script/file      -> run_script_file
/// POST /script/dynamic   -> run_script_dynamic
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/command", post(exec::run_command))
        .route("/script/content", post(exec::run_script_content))
        .route("/script/file", post(exec::run_script_file))
        .route("/script/dynamic", post(exec::run_script_dynamic))
}
