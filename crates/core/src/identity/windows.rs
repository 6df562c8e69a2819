//! Windows identity switching.
//!
//! Accounts come from the local account store (`Get-LocalUser`, with
//! `net user` for enumeration). The child is started under the target
//! account's logon token through `runas /savecred`, which reuses credentials
//! an administrator stored once for that account instead of prompting.

use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;

use super::{validate_username, IdentityDescriptor, IdentityError, IdentitySwitcher, UserList};
use crate::scripting::invocation::{Invocation, TargetAccount};

/// Shape of `Get-LocalUser | Select-Object Name, Sid, FullName | ConvertTo-Json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalUser {
    name: String,
    sid: String,
    #[serde(default)]
    full_name: Option<String>,
}

/// Identity switcher backed by the Windows local account store.
#[derive(Debug, Clone, Default)]
pub struct WindowsSwitcher;

impl WindowsSwitcher {
    pub fn new() -> Self {
        Self
    }
}

impl IdentitySwitcher for WindowsSwitcher {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn user_info(&self, username: &str) -> Result<IdentityDescriptor, IdentityError> {
        validate_username(username)?;

        let script = format!(
            "Get-LocalUser -Name '{username}' -ErrorAction Stop | \
             Select-Object Name, @{{n='Sid';e={{$_.SID.Value}}}}, FullName | ConvertTo-Json"
        );
        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .map_err(|e| IdentityError::Lookup(format!("spawning powershell: {e}")))?;

        if !output.status.success() {
            return Err(IdentityError::UserNotFound(username.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_local_user(&stdout)
    }

    fn list_users(&self) -> Result<UserList, IdentityError> {
        let output = Command::new("net")
            .arg("user")
            .output()
            .map_err(|e| IdentityError::Lookup(format!("spawning net user: {e}")))?;

        if !output.status.success() {
            return Err(IdentityError::Lookup(format!(
                "net user exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(UserList::new(account_table_lines(&stdout), split_account_row))
    }

    fn switch_to(
        &self,
        invocation: Invocation,
        identity: &IdentityDescriptor,
    ) -> Result<Invocation, IdentityError> {
        validate_username(&identity.username)?;

        let command_line = std::iter::once(invocation.program.as_str())
            .chain(invocation.args.iter().map(String::as_str))
            .map(quote_argument)
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Invocation {
            program: "runas".to_string(),
            args: vec![
                "/noprofile".to_string(),
                "/savecred".to_string(),
                format!("/user:{}", identity.username),
                command_line,
            ],
            env: invocation.env,
            target: Some(TargetAccount {
                username: identity.username.clone(),
                uid: None,
                gid: None,
                drop_privileges: false,
            }),
        })
    }
}

fn parse_local_user(json: &str) -> Result<IdentityDescriptor, IdentityError> {
    let user: LocalUser = serde_json::from_str(json.trim())
        .map_err(|e| IdentityError::Lookup(format!("parsing Get-LocalUser output: {e}")))?;

    // The machine SID is the account SID without its trailing RID.
    let domain = user
        .sid
        .rsplit_once('-')
        .map(|(domain, _rid)| domain.to_string())
        .unwrap_or_default();

    let system_drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());

    Ok(IdentityDescriptor {
        home: PathBuf::from(format!("{system_drive}\\Users\\{}", user.name)),
        username: user.name,
        uid: user.sid.into(),
        gid: domain.into(),
        shell: "cmd.exe".to_string(),
        gecos: user.full_name.filter(|n| !n.is_empty()),
    })
}

/// Rows of the account table printed by `net user`, between the dashed rule
/// and the trailing completion message.
fn account_table_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .take_while(|line| !line.contains("The command completed"))
        .map(str::to_string)
        .collect()
}

fn split_account_row(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Quote one argument for a Windows command line.
fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::identity::AccountId;

    const NET_USER_OUTPUT: &str = "\r\nUser accounts for \\\\BUILD-01\r\n\r\n\
-------------------------------------------------------------------------------\r\n\
Administrator            DefaultAccount           Guest                    \r\n\
svc_backup               WDAGUtilityAccount\r\n\
The command completed successfully.\r\n\r\n";

    #[test]
    fn parses_net_user_table() {
        let users: Vec<String> = UserList::new(account_table_lines(NET_USER_OUTPUT), split_account_row)
            .collect();
        assert_eq!(
            users,
            vec![
                "Administrator",
                "DefaultAccount",
                "Guest",
                "svc_backup",
                "WDAGUtilityAccount"
            ]
        );
    }

    #[test]
    fn parses_local_user_json() {
        let json = r#"{"Name":"svc_backup","Sid":"S-1-5-21-1111-2222-3333-1001","FullName":"Backup Service"}"#;
        let info = parse_local_user(json).expect("parse");
        assert_eq!(info.username, "svc_backup");
        assert_eq!(info.uid, AccountId::from("S-1-5-21-1111-2222-3333-1001"));
        assert_eq!(info.gid, AccountId::from("S-1-5-21-1111-2222-3333"));
        assert_eq!(info.gecos.as_deref(), Some("Backup Service"));
        assert!(info.home.to_string_lossy().ends_with("svc_backup"));
    }

    #[test]
    fn garbage_json_is_a_lookup_error() {
        assert_matches!(parse_local_user("not json"), Err(IdentityError::Lookup(_)));
    }

    #[test]
    fn switch_builds_runas_command_line() {
        let identity = IdentityDescriptor {
            username: "svc_backup".into(),
            uid: "S-1-5-21-1-2-3-1001".into(),
            gid: "S-1-5-21-1-2-3".into(),
            home: PathBuf::from("C:\\Users\\svc_backup"),
            shell: "cmd.exe".into(),
            gecos: None,
        };
        let inv = Invocation::new("cmd").arg("/C").arg("echo hello world");

        let switched = WindowsSwitcher::new().switch_to(inv, &identity).expect("switch");
        assert_eq!(switched.program, "runas");
        assert_eq!(switched.args[2], "/user:svc_backup");
        assert_eq!(switched.args[3], "cmd /C \"echo hello world\"");
        assert!(switched.target.is_some());
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_argument("plain"), "plain");
        assert_eq!(quote_argument(""), "\"\"");
        assert_eq!(quote_argument("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
