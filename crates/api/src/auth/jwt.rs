//! Bearer token issuance and verification.
//!
//! Tokens are HS256-signed JWTs containing a [`Claims`] payload. They are
//! self-contained: nothing is stored server-side beyond the signing secret,
//! so rotating the secret invalidates every outstanding token.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `type` claim of tokens issued directly to a subject.
pub const TOKEN_KIND_ACCESS: &str = "access";
/// `type` claim of tokens paired with an API key.
pub const TOKEN_KIND_API_KEY: &str = "api_key";

/// Default token lifetime in hours.
pub const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;

/// JWT claims embedded in every token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject the token was issued to.
    pub sub: String,
    /// Granted permission scopes (see [`crate::auth::scopes`]).
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier (UUID v4) for audit.
    pub jti: String,
    #[serde(rename = "type", default = "access_kind")]
    pub kind: String,
    /// Keyed fingerprint of the paired API key, for `api_key` tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub akh: Option<String>,
}

fn access_kind() -> String {
    TOKEN_KIND_ACCESS.to_string()
}

impl Claims {
    /// Whether every scope in `required` was granted.
    pub fn has_permissions(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|scope| self.permissions.iter().any(|p| p == scope))
    }
}

/// Token signing configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Lifetime of issued tokens.
    pub token_ttl: Duration,
}

/// Why a token was refused.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authentication token")]
    Missing,

    #[error("ExpiredToken: token has expired")]
    Expired,

    #[error("InvalidSignature: token signature is invalid")]
    InvalidSignature,

    #[error("MalformedToken: {0}")]
    Malformed(String),

    #[error("issuance secret is missing or does not match")]
    InvalidSecret,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Everything a new token carries apart from timestamps and `jti`.
#[derive(Debug, Clone)]
pub struct TokenGrant<'a> {
    pub subject: &'a str,
    pub permissions: &'a [String],
    pub kind: &'a str,
    pub api_key_fingerprint: Option<String>,
}

/// Sign a token for `grant`, valid for `ttl` from now.
pub fn issue_token(
    grant: TokenGrant<'_>,
    ttl: Duration,
    config: &JwtConfig,
) -> Result<String, AuthError> {
    let now = chrono::Utc::now().timestamp();
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

    let claims = Claims {
        sub: grant.subject.to_string(),
        permissions: grant.permissions.to_vec(),
        exp: now.saturating_add(ttl_secs),
        iat: now,
        jti: Uuid::new_v4().to_string(),
        kind: grant.kind.to_string(),
        akh: grant.api_key_fingerprint,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Validate signature and expiry, returning the embedded [`Claims`].
///
/// No leeway is granted: a token is expired the second after its `exp`.
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
        _ => AuthError::Malformed(e.to_string()),
    })
}
