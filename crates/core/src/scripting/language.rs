//! Script language detection and interpreter selection.
//!
//! Detection order is fixed: interpreter directive (`#!`) on the first line,
//! then the file extension of the name hint, then the configured fallback.
//! Script bodies are never sniffed beyond the first line.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::invocation::Invocation;

/// A language the agent knows how to hand to an interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Shell,
    Python,
    PowerShell,
    Batch,
}

impl Language {
    /// File extension used when the script is materialized.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Shell => "sh",
            Self::Python => "py",
            Self::PowerShell => "ps1",
            Self::Batch => "bat",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Python => "python",
            Self::PowerShell => "powershell",
            Self::Batch => "batch",
        }
    }

    /// Interpreter command line that runs `script`.
    pub fn interpreter(self, script: &Path) -> Invocation {
        let script = script.to_string_lossy().into_owned();
        match self {
            Self::Shell => Invocation::new("bash").arg(script),
            Self::Python if cfg!(windows) => Invocation::new("python").arg(script),
            Self::Python => Invocation::new("python3").arg(script),
            Self::PowerShell if cfg!(windows) => Invocation::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"])
                .arg(script),
            Self::PowerShell => Invocation::new("pwsh")
                .args(["-NoProfile", "-NonInteractive", "-File"])
                .arg(script),
            Self::Batch => Invocation::new("cmd").arg("/C").arg(script),
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "sh" | "bash" | "zsh" | "ksh" => Some(Self::Shell),
            "py" | "pyw" => Some(Self::Python),
            "ps1" | "psm1" => Some(Self::PowerShell),
            "bat" | "cmd" => Some(Self::Batch),
            _ => None,
        }
    }

    /// Map an interpreter named by a `#!` line to a language.
    fn from_interpreter(name: &str) -> Option<Self> {
        if name.starts_with("python") {
            Some(Self::Python)
        } else if name.starts_with("pwsh") || name.starts_with("powershell") {
            Some(Self::PowerShell)
        } else if matches!(name, "sh" | "bash" | "dash" | "zsh" | "ksh" | "ash") {
            Some(Self::Shell)
        } else {
            None
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a language name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported script language: {0:?}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shell" | "sh" | "bash" => Ok(Self::Shell),
            "python" | "python3" | "py" => Ok(Self::Python),
            "powershell" | "pwsh" | "ps1" => Ok(Self::PowerShell),
            "batch" | "bat" | "cmd" => Ok(Self::Batch),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

/// Detect the language of a script from its content and an optional file name.
pub fn detect(content: &str, filename: Option<&Path>, fallback: Language) -> Language {
    if let Some(language) = shebang_language(content) {
        return language;
    }

    filename
        .and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .unwrap_or(fallback)
}

fn shebang_language(content: &str) -> Option<Language> {
    let first = content.trim_start_matches('\u{feff}').lines().next()?;
    let directive = first.strip_prefix("#!")?.trim();

    let mut parts = directive.split_whitespace();
    let program = parts.next()?;
    let mut name = basename(program);

    // `#!/usr/bin/env [-S] python3`
    if name == "env" {
        name = parts.find(|p| !p.starts_with('-')).map(basename)?;
    }

    Language::from_interpreter(name)
}

fn basename(program: &str) -> &str {
    program.rsplit(['/', '\\']).next().unwrap_or(program)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn shebang_wins_over_extension() {
        let lang = detect(
            "#!/usr/bin/python3\nprint('hi')\n",
            Some(Path::new("job.sh")),
            Language::Shell,
        );
        assert_eq!(lang, Language::Python);
    }

    #[test]
    fn env_shebang_is_followed() {
        assert_eq!(
            detect("#!/usr/bin/env -S pwsh -NoProfile\n", None, Language::Shell),
            Language::PowerShell
        );
        assert_eq!(
            detect("#!/usr/bin/env bash\necho hi", None, Language::Python),
            Language::Shell
        );
    }

    #[test]
    fn extension_used_without_shebang() {
        let path = PathBuf::from("/opt/jobs/cleanup.PS1");
        assert_eq!(
            detect("Get-ChildItem", Some(&path), Language::Shell),
            Language::PowerShell
        );
    }

    #[test]
    fn fallback_when_nothing_matches() {
        assert_eq!(detect("echo hi", None, Language::Python), Language::Python);
        assert_eq!(
            detect("#!/usr/bin/perl\n", Some(Path::new("x.txt")), Language::Shell),
            Language::Shell
        );
    }

    #[test]
    fn detection_is_stable() {
        let script = "#!/bin/bash\nsleep 10";
        let first = detect(script, None, Language::Python);
        for _ in 0..10 {
            assert_eq!(detect(script, None, Language::Python), first);
        }
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("bash".parse::<Language>(), Ok(Language::Shell));
        assert_eq!(" Python3 ".parse::<Language>(), Ok(Language::Python));
        assert_eq!("pwsh".parse::<Language>(), Ok(Language::PowerShell));
        assert_matches!("cobol".parse::<Language>(), Err(UnknownLanguage(_)));
    }

    #[test]
    fn interpreter_passes_script_path_last() {
        let inv = Language::Python.interpreter(Path::new("/tmp/run/script.py"));
        assert_eq!(inv.args.last().map(String::as_str), Some("/tmp/run/script.py"));
    }
}
