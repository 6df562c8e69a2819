//! Handlers for the `/auth` resource (API key issuance and verification).

use aiops_core::error::CoreError;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::manager::IssuedApiKey;
use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/api-key`.
#[derive(Debug, Deserialize)]
pub struct IssueApiKeyRequest {
    pub user_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Issuance secret, required when the agent is configured with one.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Request body for `POST /auth/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub api_key: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /auth/api-key
///
/// Issue an API key for `user_id` together with a token bound to it. The key
/// is returned once and never stored.
pub async fn issue_api_key(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<IssueApiKeyRequest>,
) -> AppResult<Json<IssuedApiKey>> {
    let subject = input.user_id.trim();
    if subject.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "user_id must not be empty".into(),
        )));
    }
    if input.permissions.iter().any(|p| p.trim().is_empty()) {
        return Err(AppError::Core(CoreError::Validation(
            "permissions must not contain empty names".into(),
        )));
    }

    state
        .security
        .check_issuance_secret(input.secret.as_deref())?;

    let issued = state.security.generate_api_key(subject, &input.permissions)?;
    tracing::info!(subject, permissions = ?input.permissions, "Issued API key");
    Ok(Json(issued))
}

/// POST /auth/verify
///
/// Whether `token` is a valid API-key token paired with `api_key`. An
/// invalid pair is a normal `{"valid": false}` answer, not an error.
pub async fn verify(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<VerifyRequest>,
) -> AppResult<Json<VerifyResponse>> {
    if input.api_key.is_empty() || input.token.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "api_key and token are required".into(),
        )));
    }
    let valid = state.security.verify_api_key(&input.api_key, &input.token);
    Ok(Json(VerifyResponse { valid }))
}
