//! Script Materializer: scoped on-disk artifacts for inline scripts.
//!
//! Each [`ScriptArtifact`] lives in its own freshly created directory and is
//! deleted when it is released or dropped, whichever happens first. The
//! orchestrator releases explicitly so a failed cleanup can be logged; the
//! `Drop` path covers early returns and cancelled requests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::executor::ExecError;
use super::invocation::Invocation;
use super::language::{self, Language};
use crate::identity::{IdentityDescriptor, IdentityError, IdentitySwitcher};

/// A materialized script, exclusively owned by one execution.
#[derive(Debug)]
pub struct ScriptArtifact {
    dir: TempDir,
    path: PathBuf,
    language: Language,
}

impl ScriptArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Delete the artifact now. Failures are logged, never returned.
    pub fn release(self) {
        let dir = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Released script artifact"),
            Err(e) => tracing::warn!(
                dir = %dir.display(),
                error = %e,
                "Failed to delete script artifact"
            ),
        }
    }
}

/// Writes script content to disk and turns it into an interpreter invocation.
#[derive(Debug, Clone)]
pub struct ScriptMaterializer {
    root: PathBuf,
    default_language: Language,
}

impl ScriptMaterializer {
    pub fn new(root: impl Into<PathBuf>, default_language: Language) -> Self {
        Self {
            root: root.into(),
            default_language,
        }
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    pub fn detect_language(&self, content: &str, filename: Option<&Path>) -> Language {
        language::detect(content, filename, self.default_language)
    }

    /// Write `content` to `<root>/script-XXXX/script.<ext>`.
    ///
    /// The directory is traversable by other accounts (so a switched identity
    /// can reach the file) but not listable; the file is executable.
    pub async fn materialize(
        &self,
        content: &str,
        language: Language,
    ) -> Result<ScriptArtifact, ExecError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(ExecError::Artifact)?;

        let dir = tempfile::Builder::new()
            .prefix("script-")
            .tempdir_in(&self.root)
            .map_err(ExecError::Artifact)?;
        let path = dir.path().join(format!("script.{}", language.extension()));

        tokio::fs::write(&path, content)
            .await
            .map_err(ExecError::Artifact)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            tokio::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o711))
                .await
                .map_err(ExecError::Artifact)?;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(ExecError::Artifact)?;
        }

        tracing::debug!(path = %path.display(), %language, "Materialized script");

        Ok(ScriptArtifact {
            dir,
            path,
            language,
        })
    }

    /// Interpreter command line for `script`, wrapped for `identity` if given.
    ///
    /// `env` is attached before wrapping so that switchers which reset the
    /// environment can forward it.
    pub fn build_invocation(
        &self,
        script: &Path,
        language: Language,
        env: Vec<(String, String)>,
        identity: Option<(&dyn IdentitySwitcher, &IdentityDescriptor)>,
    ) -> Result<Invocation, IdentityError> {
        let invocation = language.interpreter(script).with_env(env);
        match identity {
            Some((switcher, target)) => switcher.switch_to(invocation, target),
            None => Ok(invocation),
        }
    }
}
