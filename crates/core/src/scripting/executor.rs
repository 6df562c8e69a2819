//! Execution request/result types shared by the runner, the materializer and
//! the orchestrator.
//!
//! Defines [`ExecutionRequest`] (what to run), [`ExecutionResult`] (what
//! happened) and [`ExecError`] (why nothing could be reported at all).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::language::Language;
use crate::identity::IdentityError;

/// Exit code reported when no real exit status exists: the process timed out
/// or never started. Real exit codes are `0..=255`, or `128 + signal` when a
/// child is killed by a signal it did not expect.
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// Substrings that mark a command as destructive. Matches are logged, not
/// blocked: the caller already holds the `execute` scope.
const DANGEROUS_PATTERNS: &[&str] = &["rm -rf /", "mkfs", "dd if=/dev/zero"];

/// First destructive pattern contained in `command`, case-insensitively.
pub fn dangerous_pattern(command: &str) -> Option<&'static str> {
    let lowered = command.to_lowercase();
    DANGEROUS_PATTERNS
        .iter()
        .copied()
        .find(|pattern| lowered.contains(pattern))
}

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A command line for the platform command interpreter.
    Command(String),
    /// Script source to materialize; `language` overrides detection.
    Script {
        content: String,
        language: Option<Language>,
    },
    /// A script already on disk.
    ScriptFile(PathBuf),
}

/// One accepted request. Consumed by [`Orchestrator::execute`].
///
/// [`Orchestrator::execute`]: super::orchestrator::Orchestrator::execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub payload: Payload,
    /// Local account to run as (`None` runs as the agent).
    pub user: Option<String>,
    /// Working directory; a private scoped directory is used when `None`.
    pub working_dir: Option<PathBuf>,
    /// Requested timeout, clamped to the configured ceiling.
    pub timeout: Option<Duration>,
    pub env: Vec<(String, String)>,
}

impl ExecutionRequest {
    fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            user: None,
            working_dir: None,
            timeout: None,
            env: Vec::new(),
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::with_payload(Payload::Command(command.into()))
    }

    pub fn script(content: impl Into<String>, language: Option<Language>) -> Self {
        Self::with_payload(Payload::Script {
            content: content.into(),
            language,
        })
    }

    pub fn script_file(path: impl Into<PathBuf>) -> Self {
        Self::with_payload(Payload::ScriptFile(path.into()))
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Shape checks that must pass before anything touches the OS.
    pub fn validate(&self) -> Result<(), ExecError> {
        match &self.payload {
            Payload::Command(command) if command.trim().is_empty() => {
                return Err(ExecError::Validation("command must not be empty".into()));
            }
            Payload::Script { content, .. } if content.trim().is_empty() => {
                return Err(ExecError::Validation("script must not be empty".into()));
            }
            Payload::ScriptFile(path) if path.as_os_str().is_empty() => {
                return Err(ExecError::Validation("script_path must not be empty".into()));
            }
            _ => {}
        }

        if matches!(&self.user, Some(user) if user.trim().is_empty()) {
            return Err(ExecError::Validation("user must not be empty".into()));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(ExecError::Validation(
                "timeout must be at least one second".into(),
            ));
        }

        for (key, value) in &self.env {
            if key.is_empty() || key.contains(['=', '\0']) || value.contains('\0') {
                return Err(ExecError::Validation(format!(
                    "invalid environment variable {key:?}"
                )));
            }
        }

        Ok(())
    }
}

/// Outcome of one execution, produced exactly once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured stdout (possibly partial on timeout or truncation).
    pub output: String,
    /// Captured stderr, followed by any agent-side failure message.
    pub error: String,
    /// Process exit code, or [`SENTINEL_EXIT_CODE`].
    pub return_code: i32,
    /// `return_code == 0` and no timeout or switching failure.
    pub success: bool,
    pub timed_out: bool,
    /// At least one stream exceeded the capture limit.
    pub truncated: bool,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A request that was refused before spawn for a reason the caller must
    /// see in the result (unknown user, no permission to switch, ...).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: message.into(),
            return_code: SENTINEL_EXIT_CODE,
            success: false,
            timed_out: false,
            truncated: false,
            duration_ms: 0,
        }
    }
}

/// Failures that prevent producing an [`ExecutionResult`].
#[derive(Debug)]
pub enum ExecError {
    /// Request shape is invalid (empty command, zero timeout, ...).
    Validation(String),
    /// `script_path` does not name an existing file.
    ScriptNotFound(PathBuf),
    /// The process could not be spawned at all.
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// The working directory could not be prepared.
    WorkingDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The script artifact could not be written.
    Artifact(std::io::Error),
    /// Waiting on the child failed.
    Io(std::io::Error),
    /// The account store could not be queried.
    Identity(IdentityError),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::ScriptNotFound(path) => write!(f, "Script not found: {}", path.display()),
            Self::Spawn { program, source } => write!(f, "Failed to spawn {program}: {source}"),
            Self::WorkingDir { path, source } => {
                write!(f, "Cannot prepare working directory {}: {source}", path.display())
            }
            Self::Artifact(err) => write!(f, "Cannot write script artifact: {err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Identity(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } | Self::WorkingDir { source, .. } => Some(source),
            Self::Artifact(err) | Self::Io(err) => Some(err),
            Self::Identity(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
