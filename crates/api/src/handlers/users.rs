//! Handlers for the `/users` resource (local account store).

use aiops_core::error::CoreError;
use aiops_core::identity::{validate_username, IdentityDescriptor, IdentityError};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireRead;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<String>,
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    RequireRead(_user): RequireRead,
) -> AppResult<Json<UserListResponse>> {
    let users = state.orchestrator.list_users().await?;
    Ok(Json(UserListResponse { users }))
}

/// GET /users/{name}
pub async fn get_user(
    State(state): State<AppState>,
    RequireRead(_user): RequireRead,
    Path(name): Path<String>,
) -> AppResult<Json<IdentityDescriptor>> {
    validate_username(&name)?;

    match state.orchestrator.user_info(&name).await {
        Ok(descriptor) => Ok(Json(descriptor)),
        Err(IdentityError::UserNotFound(name)) => Err(AppError::Core(CoreError::NotFound {
            entity: "User",
            name,
        })),
        Err(e) => Err(e.into()),
    }
}
