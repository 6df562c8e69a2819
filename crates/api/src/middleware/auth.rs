//! Bearer token extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::jwt::AuthError;
use crate::error::AppError;
use crate::state::AppState;

/// Caller authenticated by a Bearer token in the `Authorization` header.
///
/// Any handler taking this (or one of the [`rbac`](super::rbac) guards) is
/// unreachable without a verified token:
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(subject = %user.subject, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Token subject (`claims.sub`).
    pub subject: String,
    /// Granted permission scopes.
    pub permissions: Vec<String>,
}

impl AuthUser {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.permissions.iter().any(|p| p == scope)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AuthError::Malformed("invalid Authorization format, expected: Bearer <token>".into())
            })?;

        let claims = state.security.verify_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            e
        })?;

        Ok(AuthUser {
            subject: claims.sub,
            permissions: claims.permissions,
        })
    }
}
