//! The Security Manager facade.
//!
//! Built once at startup from [`ServerConfig`](crate::config::ServerConfig)
//! and shared read-only through `AppState`; every method is safe to call
//! concurrently without locking.

use std::time::Duration;

use serde::Serialize;

use super::api_key::{self, fingerprint, fingerprint_matches};
use super::cipher::{Cipher, CipherError};
use super::jwt::{self, AuthError, Claims, JwtConfig, TokenGrant, TOKEN_KIND_ACCESS, TOKEN_KIND_API_KEY};
use super::password;

/// An API key and its paired token, returned once at issuance.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    pub api_key: String,
    pub token: String,
}

pub struct SecurityManager {
    jwt: JwtConfig,
    cipher: Cipher,
    issuance_secret_hash: Option<String>,
}

impl SecurityManager {
    /// `issuance_secret_hash`, when set, gates API key issuance behind a
    /// shared secret (Argon2 PHC hash).
    pub fn new(jwt: JwtConfig, aes_key: &str, issuance_secret_hash: Option<String>) -> Self {
        Self {
            jwt,
            cipher: Cipher::new(aes_key),
            issuance_secret_hash,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.jwt.token_ttl
    }

    /// Sign an access token for `subject` with `scopes`, valid for `ttl`
    /// (the configured lifetime when `None`).
    pub fn issue_token(
        &self,
        subject: &str,
        scopes: &[String],
        ttl: Option<Duration>,
    ) -> Result<String, AuthError> {
        jwt::issue_token(
            TokenGrant {
                subject,
                permissions: scopes,
                kind: TOKEN_KIND_ACCESS,
                api_key_fingerprint: None,
            },
            ttl.unwrap_or(self.jwt.token_ttl),
            &self.jwt,
        )
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        jwt::verify_token(token, &self.jwt)
    }

    /// Whether `token` is valid and grants every scope in `required`.
    pub fn validate_token_permissions(&self, token: &str, required: &[&str]) -> bool {
        match self.verify_token(token) {
            Ok(claims) if claims.has_permissions(required) => true,
            Ok(claims) => {
                tracing::warn!(subject = %claims.sub, ?required, "Token lacks required permissions");
                false
            }
            Err(_) => false,
        }
    }

    /// Issue a new API key for `subject` with a token bound to it.
    pub fn generate_api_key(
        &self,
        subject: &str,
        permissions: &[String],
    ) -> Result<IssuedApiKey, AuthError> {
        let api_key = api_key::generate_api_key();
        let token = jwt::issue_token(
            TokenGrant {
                subject,
                permissions,
                kind: TOKEN_KIND_API_KEY,
                api_key_fingerprint: Some(fingerprint(&self.jwt.secret, &api_key)),
            },
            self.jwt.token_ttl,
            &self.jwt,
        )?;
        Ok(IssuedApiKey { api_key, token })
    }

    /// Whether `token` is a valid API-key token bound to `api_key`.
    pub fn verify_api_key(&self, api_key: &str, token: &str) -> bool {
        let claims = match self.verify_token(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "API key token rejected");
                return false;
            }
        };
        if claims.kind != TOKEN_KIND_API_KEY {
            return false;
        }
        claims
            .akh
            .as_deref()
            .is_some_and(|expected| fingerprint_matches(&self.jwt.secret, api_key, expected))
    }

    /// Check the caller's issuance secret against the configured hash.
    /// Always passes when no hash is configured.
    pub fn check_issuance_secret(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let Some(hash) = &self.issuance_secret_hash else {
            return Ok(());
        };
        match provided {
            Some(secret) if password::verify_secret(secret, hash) => Ok(()),
            _ => Err(AuthError::InvalidSecret),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.cipher.encrypt_str(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        self.cipher.decrypt_str(ciphertext)
    }

    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::auth::scopes;

    fn manager(issuance_hash: Option<String>) -> SecurityManager {
        SecurityManager::new(
            JwtConfig {
                secret: "manager-test-secret".into(),
                token_ttl: Duration::from_secs(600),
            },
            "manager-test-aes-key",
            issuance_hash,
        )
    }

    #[test]
    fn api_key_and_token_verify_together() {
        let m = manager(None);
        let issued = m
            .generate_api_key("ops-bot", &["execute".to_string()])
            .expect("issue");
        assert!(m.verify_api_key(&issued.api_key, &issued.token));
        assert!(!issued.token.contains(&issued.api_key));
    }

    #[test]
    fn api_key_from_another_issuance_does_not_verify() {
        let m = manager(None);
        let a = m.generate_api_key("a", &[]).expect("issue");
        let b = m.generate_api_key("b", &[]).expect("issue");
        assert!(!m.verify_api_key(&a.api_key, &b.token));
    }

    #[test]
    fn access_token_is_not_an_api_key_token() {
        let m = manager(None);
        let token = m.issue_token("ops-bot", &[], None).expect("issue");
        assert!(!m.verify_api_key("anything", &token));
    }

    #[test]
    fn token_permissions() {
        let m = manager(None);
        let token = m
            .issue_token("ops-bot", &["read".to_string()], None)
            .expect("issue");
        assert!(m.validate_token_permissions(&token, &["read"]));
        assert!(!m.validate_token_permissions(&token, &["execute"]));
        assert!(!m.validate_token_permissions("garbage", &[]));
    }

    #[test]
    fn unrouted_scopes_are_carried_but_grant_nothing() {
        let m = manager(None);
        let token = m
            .issue_token("ops-bot", &["write".to_string()], None)
            .expect("issue");
        assert!(m.validate_token_permissions(&token, &["write"]));
        assert!(!m.validate_token_permissions(&token, &[scopes::EXECUTE]));
        assert!(!m.validate_token_permissions(&token, &[scopes::READ]));
    }

    #[test]
    fn issuance_gate() {
        let open = manager(None);
        assert!(open.check_issuance_secret(None).is_ok());

        let hash = password::hash_secret("bootstrap").expect("hash");
        let gated = manager(Some(hash));
        assert!(gated.check_issuance_secret(Some("bootstrap")).is_ok());
        assert_matches!(gated.check_issuance_secret(Some("nope")), Err(AuthError::InvalidSecret));
        assert_matches!(gated.check_issuance_secret(None), Err(AuthError::InvalidSecret));
    }

    #[test]
    fn text_encryption_round_trip() {
        let m = manager(None);
        let sealed = m.encrypt("s3cret").expect("encrypt");
        assert_eq!(m.decrypt(&sealed).expect("decrypt"), "s3cret");
    }
}
