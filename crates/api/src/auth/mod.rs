//! Security Manager: authentication and protection primitives.
//!
//! - [`jwt`] -- signed, expiring bearer tokens carrying permission scopes.
//! - [`password`] -- Argon2id secret hashing and verification.
//! - [`cipher`] -- AES-256-GCM authenticated encryption for data at rest.
//! - [`api_key`] -- random API keys, keyed fingerprints, random key material.
//! - [`manager`] -- [`SecurityManager`](manager::SecurityManager), the facade
//!   holding the process-wide signing secret and cipher key.

pub mod api_key;
pub mod cipher;
pub mod jwt;
pub mod manager;
pub mod password;

/// Permission scope names carried in tokens.
pub mod scopes {
    /// Run commands and scripts.
    pub const EXECUTE: &str = "execute";
    /// Inspect the host (status, accounts).
    pub const READ: &str = "read";
}
