use aiops_core::error::CoreError;
use aiops_core::identity::IdentityError;
use aiops_core::scripting::executor::ExecError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::jwt::AuthError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of `aiops_core` and the security layer, and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// `{"error": ..., "code": ...}` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `aiops_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Token missing, expired, forged or malformed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The execution pipeline could not produce a result.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Account lookup outside of an execution (user endpoints).
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string())
                }
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            },

            // --- Security ---
            AppError::Auth(err) => classify_auth_error(err),

            // --- Execution ---
            AppError::Exec(err) => classify_exec_error(err),

            // --- Account store ---
            AppError::Identity(err) => classify_identity_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("request body must be valid JSON: {}", rejection.body_text()))
    }
}

fn classify_auth_error(err: &AuthError) -> (StatusCode, &'static str, String) {
    match err {
        AuthError::Signing(msg) => {
            tracing::error!(error = %msg, "Token signing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_MESSAGE.to_string(),
            )
        }
        other => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", other.to_string()),
    }
}

/// Validation and missing scripts are the caller's fault; everything else is
/// an infrastructure fault reported with its cause.
fn classify_exec_error(err: &ExecError) -> (StatusCode, &'static str, String) {
    match err {
        ExecError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        ExecError::ScriptNotFound(_) => (StatusCode::NOT_FOUND, "SCRIPT_NOT_FOUND", err.to_string()),
        other => {
            tracing::error!(error = %other, "Execution infrastructure fault");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "EXECUTION_ERROR",
                other.to_string(),
            )
        }
    }
}

fn classify_identity_error(err: &IdentityError) -> (StatusCode, &'static str, String) {
    match err {
        IdentityError::UserNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        IdentityError::InvalidName(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        IdentityError::PermissionDenied(_) => {
            (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string())
        }
        IdentityError::PlatformUnsupported(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PLATFORM_UNSUPPORTED",
            err.to_string(),
        ),
        IdentityError::Lookup(msg) => {
            tracing::error!(error = %msg, "Account lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_MESSAGE.to_string(),
            )
        }
    }
}
