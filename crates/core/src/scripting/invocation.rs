//! The program line handed to the process runner.

use std::fmt;

/// Account a child process runs as when it differs from the agent's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAccount {
    pub username: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// The runner itself must `setuid`/`setgid` in the child. When `false`
    /// the program (e.g. `sudo`, `runas`) performs the switch.
    pub drop_privileges: bool,
}

/// A fully resolved program invocation: no shell parsing happens after this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
    pub target: Option<TargetAccount>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            target: None,
        }
    }

    /// Run `command` through the platform command interpreter
    /// (`sh -c` on POSIX, `cmd /C` on Windows).
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(command)
        } else {
            Self::new("sh").arg("-c").arg(command)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set `key`, replacing an earlier value for the same key.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    pub fn with_env(self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        vars.into_iter()
            .fold(self, |inv, (k, v)| inv.with_env_var(k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.program.trim().is_empty()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_wraps_command_in_one_argument() {
        let inv = Invocation::shell("echo hello; exit 3");
        assert_eq!(inv.args.last().map(String::as_str), Some("echo hello; exit 3"));
        assert_eq!(inv.args.len(), 2);
    }

    #[test]
    fn env_var_replaces_previous_value() {
        let inv = Invocation::new("env")
            .with_env_var("A", "1")
            .with_env_var("B", "2")
            .with_env_var("A", "3");
        assert_eq!(
            inv.env,
            vec![("B".to_string(), "2".to_string()), ("A".to_string(), "3".to_string())]
        );
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let inv = Invocation::new("sh").args(["-c", "echo hi"]);
        assert_eq!(inv.to_string(), "sh -c \"echo hi\"");
    }

    #[test]
    fn blank_program_is_empty() {
        assert!(Invocation::new("  ").is_empty());
        assert!(!Invocation::new("true").is_empty());
    }
}
