//! POSIX identity switching.
//!
//! Accounts are resolved through the system account database (`getpwnam`,
//! so NSS sources such as LDAP are honoured). How the switch happens depends
//! on the agent's own privileges, decided once at startup:
//!
//! | Agent runs as      | Strategy                                          |
//! |--------------------|---------------------------------------------------|
//! | root               | child calls `setgid`/`setuid` before `exec`       |
//! | non-root with sudo | payload wrapped in `sudo -n -H -u <user> --`      |
//! | non-root, no sudo  | only the agent's own account is reachable         |

use std::path::{Path, PathBuf};
use std::process::Command;

use nix::unistd::{Uid, User};

use super::{validate_username, AccountId, IdentityDescriptor, IdentityError, IdentitySwitcher, UserList};
use crate::scripting::invocation::{Invocation, TargetAccount};

/// Fallback account file when `getent` is not installed (e.g. macOS).
const PASSWD_FILE: &str = "/etc/passwd";

/// How the agent reaches another account.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SwitchMode {
    Root,
    Sudo(PathBuf),
    Unprivileged,
}

/// Identity switcher for Linux, macOS and the BSDs.
#[derive(Debug, Clone)]
pub struct PosixSwitcher {
    mode: SwitchMode,
}

impl PosixSwitcher {
    /// Inspect the agent's privileges and pick a switching strategy.
    pub fn detect() -> Self {
        let mode = if nix::unistd::geteuid().is_root() {
            SwitchMode::Root
        } else if let Some(sudo) = find_in_path("sudo") {
            SwitchMode::Sudo(sudo)
        } else {
            SwitchMode::Unprivileged
        };
        tracing::info!(mode = ?mode, "POSIX identity switcher ready");
        Self { mode }
    }

    /// Whether `identity` is the account the agent already runs as.
    fn is_current_user(identity: &IdentityDescriptor) -> bool {
        identity.uid.as_numeric() == Some(nix::unistd::getuid().as_raw())
    }
}

impl IdentitySwitcher for PosixSwitcher {
    fn platform(&self) -> &'static str {
        "posix"
    }

    fn user_info(&self, username: &str) -> Result<IdentityDescriptor, IdentityError> {
        validate_username(username)?;

        let user = User::from_name(username)
            .map_err(|e| IdentityError::Lookup(format!("getpwnam({username}): {e}")))?
            .ok_or_else(|| IdentityError::UserNotFound(username.to_string()))?;

        let gecos = user
            .gecos
            .to_str()
            .ok()
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        Ok(IdentityDescriptor {
            username: user.name,
            uid: user.uid.as_raw().into(),
            gid: user.gid.as_raw().into(),
            home: user.dir,
            shell: user.shell.to_string_lossy().into_owned(),
            gecos,
        })
    }

    fn list_users(&self) -> Result<UserList, IdentityError> {
        let raw = match Command::new("getent").arg("passwd").output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => {
                tracing::debug!(
                    status = %output.status,
                    "getent passwd failed, reading {PASSWD_FILE}"
                );
                read_passwd_file()?
            }
            Err(e) => {
                tracing::debug!(error = %e, "getent unavailable, reading {PASSWD_FILE}");
                read_passwd_file()?
            }
        };

        let lines = raw.lines().map(str::to_string).collect();
        Ok(UserList::new(lines, passwd_username))
    }

    fn switch_to(
        &self,
        invocation: Invocation,
        identity: &IdentityDescriptor,
    ) -> Result<Invocation, IdentityError> {
        if Self::is_current_user(identity) {
            return Ok(invocation);
        }

        let uid = parse_id(&identity.uid, "uid")?;
        let gid = parse_id(&identity.gid, "gid")?;

        match &self.mode {
            SwitchMode::Root => {
                let mut switched = invocation
                    .with_env_var("HOME", identity.home.to_string_lossy())
                    .with_env_var("USER", &identity.username)
                    .with_env_var("LOGNAME", &identity.username)
                    .with_env_var("SHELL", &identity.shell);
                switched.target = Some(TargetAccount {
                    username: identity.username.clone(),
                    uid: Some(uid),
                    gid: Some(gid),
                    drop_privileges: true,
                });
                Ok(switched)
            }
            SwitchMode::Sudo(sudo) => Ok(wrap_with_sudo(sudo, invocation, identity, uid, gid)),
            SwitchMode::Unprivileged => Err(IdentityError::PermissionDenied(format!(
                "agent runs as uid {} without sudo; cannot switch to {}",
                Uid::current(),
                identity.username
            ))),
        }
    }
}

/// Build `sudo -n -H -u <user> -- [env K=V ...] <program> <args...>`.
///
/// sudo resets the environment, so request variables are passed through
/// `env` on the far side of the switch.
fn wrap_with_sudo(
    sudo: &Path,
    invocation: Invocation,
    identity: &IdentityDescriptor,
    uid: u32,
    gid: u32,
) -> Invocation {
    let mut args = vec![
        "-n".to_string(),
        "-H".to_string(),
        "-u".to_string(),
        identity.username.clone(),
        "--".to_string(),
    ];
    if !invocation.env.is_empty() {
        args.push("env".to_string());
        args.extend(invocation.env.iter().map(|(k, v)| format!("{k}={v}")));
    }
    args.push(invocation.program);
    args.extend(invocation.args);

    Invocation {
        program: sudo.to_string_lossy().into_owned(),
        args,
        env: Vec::new(),
        target: Some(TargetAccount {
            username: identity.username.clone(),
            uid: Some(uid),
            gid: Some(gid),
            drop_privileges: false,
        }),
    }
}

fn parse_id(id: &AccountId, what: &str) -> Result<u32, IdentityError> {
    id.as_numeric()
        .ok_or_else(|| IdentityError::Lookup(format!("account database returned {what} {id}")))
}

fn read_passwd_file() -> Result<String, IdentityError> {
    std::fs::read_to_string(PASSWD_FILE)
        .map_err(|e| IdentityError::Lookup(format!("reading {PASSWD_FILE}: {e}")))
}

/// Account name from one `passwd(5)` line; comments and blanks yield nothing.
fn passwd_username(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Vec::new();
    }
    match line.split(':').next() {
        Some(name) if !name.is_empty() => vec![name.to_string()],
        _ => Vec::new(),
    }
}

/// First executable named `program` on `$PATH`.
fn find_in_path(program: &str) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| {
            std::fs::metadata(candidate)
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
}
