//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- Verifies the Bearer token and exposes its claims.
//! - [`rbac::RequireExecute`] -- Requires the `execute` scope.
//! - [`rbac::RequireRead`] -- Requires the `read` scope.
//! - [`rbac::RequireAuth`] -- Requires any valid token.

pub mod auth;
pub mod rbac;
