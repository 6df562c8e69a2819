//! Execution under a different local account.
//!
//! [`IdentitySwitcher`] is the capability interface the orchestrator talks to.
//! Exactly one implementation is selected at startup by [`detect`]:
//!
//! - [`posix::PosixSwitcher`] -- account database via `getpwnam`, privileges
//!   dropped with `setuid`/`setgid` when running as root, `sudo -u` otherwise.
//! - [`windows::WindowsSwitcher`] -- local account store via `Get-LocalUser` /
//!   `net user`, child started under the account with `runas`.
//!
//! Account lookups are never cached: every call reflects the live OS state.

#[cfg(unix)]
pub mod posix;
#[cfg(any(windows, test))]
pub mod windows;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::scripting::invocation::Invocation;

/// Longest account name accepted before any OS lookup is attempted.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Account or group identifier as the host OS reports it.
///
/// Serialized untagged: a JSON number on POSIX, a SID string on Windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AccountId {
    Numeric(u32),
    Sid(String),
}

impl AccountId {
    pub fn as_numeric(&self) -> Option<u32> {
        match self {
            Self::Numeric(id) => Some(*id),
            Self::Sid(_) => None,
        }
    }
}

impl From<u32> for AccountId {
    fn from(id: u32) -> Self {
        Self::Numeric(id)
    }
}

impl From<String> for AccountId {
    fn from(sid: String) -> Self {
        Self::Sid(sid)
    }
}

impl From<&str> for AccountId {
    fn from(sid: &str) -> Self {
        Self::Sid(sid.to_string())
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Sid(sid) => f.write_str(sid),
        }
    }
}

/// Resolved snapshot of a local account, fetched at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityDescriptor {
    pub username: String,
    /// uid on POSIX, account SID on Windows.
    pub uid: AccountId,
    /// Primary gid on POSIX, machine domain SID on Windows.
    pub gid: AccountId,
    pub home: PathBuf,
    /// Login shell on POSIX, command interpreter on Windows.
    pub shell: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gecos: Option<String>,
}

/// Errors raised while resolving or switching to another account.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("UserNotFound: user not found: {0}")]
    UserNotFound(String),

    #[error("InvalidUsername: invalid username: {0:?}")]
    InvalidName(String),

    #[error("PermissionDenied: {0}")]
    PermissionDenied(String),

    #[error("PlatformUnsupported: identity switching is not supported on {0}")]
    PlatformUnsupported(String),

    #[error("account lookup failed: {0}")]
    Lookup(String),
}

impl IdentityError {
    /// Whether the error belongs to the request (reported inside an execution
    /// result) rather than to the agent's own infrastructure.
    pub fn is_request_failure(&self) -> bool {
        !matches!(self, Self::Lookup(_))
    }
}

/// Snapshot of account names taken when [`IdentitySwitcher::list_users`] ran.
///
/// Lines of the raw account listing are parsed lazily as the iterator advances.
/// The snapshot is finite and cannot be restarted; call `list_users` again for
/// a fresh view.
pub struct UserList {
    lines: std::vec::IntoIter<String>,
    parse: fn(&str) -> Vec<String>,
    pending: std::vec::IntoIter<String>,
}

impl UserList {
    pub(crate) fn new(lines: Vec<String>, parse: fn(&str) -> Vec<String>) -> Self {
        Self {
            lines: lines.into_iter(),
            parse,
            pending: Vec::new().into_iter(),
        }
    }
}

impl Iterator for UserList {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(name) = self.pending.next() {
                return Some(name);
            }
            let line = self.lines.next()?;
            self.pending = (self.parse)(&line).into_iter();
        }
    }
}

/// Platform capability for running a payload as another local account.
pub trait IdentitySwitcher: Send + Sync {
    /// Short platform tag (`"posix"` or `"windows"`), used in logs.
    fn platform(&self) -> &'static str;

    /// Resolve `username` against the account store.
    fn user_info(&self, username: &str) -> Result<IdentityDescriptor, IdentityError>;

    /// Enumerate local account names.
    fn list_users(&self) -> Result<UserList, IdentityError>;

    /// Rewrite `invocation` so that it runs as `identity`.
    fn switch_to(
        &self,
        invocation: Invocation,
        identity: &IdentityDescriptor,
    ) -> Result<Invocation, IdentityError>;

    /// Whether `username` currently exists. Lookup failures count as absent.
    fn user_exists(&self, username: &str) -> bool {
        self.user_info(username).is_ok()
    }
}

/// Select the identity switcher for the running OS.
#[cfg(unix)]
pub fn detect() -> Result<Arc<dyn IdentitySwitcher>, IdentityError> {
    Ok(Arc::new(posix::PosixSwitcher::detect()))
}

/// Select the identity switcher for the running OS.
#[cfg(windows)]
pub fn detect() -> Result<Arc<dyn IdentitySwitcher>, IdentityError> {
    Ok(Arc::new(windows::WindowsSwitcher::new()))
}

/// Select the identity switcher for the running OS.
#[cfg(not(any(unix, windows)))]
pub fn detect() -> Result<Arc<dyn IdentitySwitcher>, IdentityError> {
    Err(IdentityError::PlatformUnsupported(
        crate::platform::platform_name().to_string(),
    ))
}

/// Reject names that cannot be a local account before they reach the OS.
///
/// Accepts ASCII letters, digits, `.`, `_`, `-` and a trailing `$` (machine
/// accounts); the first character may not be `-`.
pub fn validate_username(username: &str) -> Result<(), IdentityError> {
    let invalid = || IdentityError::InvalidName(username.to_string());

    if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
        return Err(invalid());
    }
    if username.starts_with('-') {
        return Err(invalid());
    }

    let body = username.strip_suffix('$').unwrap_or(username);
    if body.is_empty()
        || !body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid());
    }
    Ok(())
}
