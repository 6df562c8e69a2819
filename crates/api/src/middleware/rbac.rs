//! Scope-based access control extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects tokens that do not carry
//! the scope an endpoint needs, enforcing authorization at the type level.

use aiops_core::error::CoreError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::auth::AuthUser;
use crate::auth::scopes;
use crate::error::AppError;
use crate::state::AppState;

async fn require_scope(
    parts: &mut Parts,
    state: &AppState,
    scope: &'static str,
) -> Result<AuthUser, AppError> {
    let user = AuthUser::from_request_parts(parts, state).await?;
    if !user.has_scope(scope) {
        tracing::warn!(subject = %user.subject, scope, "Token lacks required scope");
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "token lacks the `{scope}` permission"
        ))));
    }
    Ok(user)
}

/// Requires the `execute` scope. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn run(RequireExecute(user): RequireExecute) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireExecute(pub AuthUser);

impl FromRequestParts<AppState> for RequireExecute {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_scope(parts, state, scopes::EXECUTE)
            .await
            .map(RequireExecute)
    }
}

/// Requires the `read` scope. Rejects with 403 Forbidden otherwise.
pub struct RequireRead(pub AuthUser);

impl FromRequestParts<AppState> for RequireRead {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_scope(parts, state, scopes::READ).await.map(RequireRead)
    }
}

/// Requires any valid token, whatever its scopes.
///
/// Functionally equivalent to [`AuthUser`] but named explicitly for routes
/// where "authentication required" should read as intent.
pub struct RequireAuth(pub AuthUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        Ok(RequireAuth(user))
    }
}
