//! Execution orchestrator.
//!
//! Ties the pieces together for one request:
//! 1. Validate the request shape and settle the effective timeout.
//! 2. Resolve the target identity (fresh account lookup, never cached).
//! 3. Build the invocation: shell command, materialized script, or a script
//!    already on disk.
//! 4. Wrap it for the target identity and hand it to the Process Runner.
//! 5. Release the script artifact, whatever the outcome.
//!
//! Identity problems that belong to the request (unknown user, no right to
//! switch) come back as an unsuccessful [`ExecutionResult`]; only
//! infrastructure faults surface as [`ExecError`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use super::artifact::ScriptMaterializer;
use super::executor::{dangerous_pattern, ExecError, ExecutionRequest, ExecutionResult, Payload};
use super::invocation::Invocation;
use super::subprocess::ProcessRunner;
use crate::identity::{IdentityDescriptor, IdentityError, IdentitySwitcher};

/// Bytes read from an on-disk script to look for an interpreter directive.
const SHEBANG_PROBE_BYTES: u64 = 256;

/// Runs [`ExecutionRequest`]s. Shared by all request handlers via `Arc`.
pub struct Orchestrator {
    runner: ProcessRunner,
    materializer: ScriptMaterializer,
    switcher: Option<Arc<dyn IdentitySwitcher>>,
    max_timeout: Duration,
}

impl Orchestrator {
    /// `switcher` is `None` on platforms without identity switching; requests
    /// naming a user then fail with `PlatformUnsupported`.
    pub fn new(
        runner: ProcessRunner,
        materializer: ScriptMaterializer,
        switcher: Option<Arc<dyn IdentitySwitcher>>,
        max_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            materializer,
            switcher,
            max_timeout,
        }
    }

    pub fn materializer(&self) -> &ScriptMaterializer {
        &self.materializer
    }

    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// The platform identity switcher.
    pub fn identity(&self) -> Result<Arc<dyn IdentitySwitcher>, IdentityError> {
        self.switcher.clone().ok_or_else(|| {
            IdentityError::PlatformUnsupported(crate::platform::platform_name().to_string())
        })
    }

    /// Requested timeout clamped to the configured ceiling.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.max_timeout, |t| t.min(self.max_timeout))
    }

    /// Resolve `username` against the live account store.
    pub async fn user_info(&self, username: &str) -> Result<IdentityDescriptor, IdentityError> {
        let switcher = self.identity()?;
        let username = username.to_string();
        tokio::task::spawn_blocking(move || switcher.user_info(&username))
            .await
            .map_err(|e| IdentityError::Lookup(format!("lookup task failed: {e}")))?
    }

    /// Snapshot of local account names.
    pub async fn list_users(&self) -> Result<Vec<String>, IdentityError> {
        let switcher = self.identity()?;
        tokio::task::spawn_blocking(move || switcher.list_users().map(|users| users.collect::<Vec<_>>()))
            .await
            .map_err(|e| IdentityError::Lookup(format!("listing task failed: {e}")))?
    }

    /// Run one request to completion.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, ExecError> {
        request.validate()?;
        let timeout = self.effective_timeout(request.timeout);

        tracing::info!(
            kind = payload_kind(&request.payload),
            user = request.user.as_deref().unwrap_or("-"),
            timeout_secs = timeout.as_secs(),
            "Executing request"
        );

        let identity = match &request.user {
            None => None,
            Some(user) => match self.resolve(user).await {
                Ok(resolved) => Some(resolved),
                Err(e) => return reject(e),
            },
        };
        let identity_ref = identity
            .as_ref()
            .map(|(switcher, descriptor)| (switcher.as_ref(), descriptor));

        let working_dir = request.working_dir.as_deref();

        match request.payload {
            Payload::Command(command) => {
                if let Some(pattern) = dangerous_pattern(&command) {
                    tracing::warn!(pattern, "Command matches a destructive pattern");
                }
                let invocation = Invocation::shell(&command).with_env(request.env);
                let invocation = match identity_ref {
                    Some((switcher, target)) => match switcher.switch_to(invocation, target) {
                        Ok(inv) => inv,
                        Err(e) => return reject(e),
                    },
                    None => invocation,
                };
                self.runner.run(&invocation, working_dir, timeout).await
            }
            Payload::Script { content, language } => {
                let language =
                    language.unwrap_or_else(|| self.materializer.detect_language(&content, None));
                let artifact = self.materializer.materialize(&content, language).await?;

                let invocation = match self.materializer.build_invocation(
                    artifact.path(),
                    language,
                    request.env,
                    identity_ref,
                ) {
                    Ok(inv) => inv,
                    Err(e) => {
                        artifact.release();
                        return reject(e);
                    }
                };

                let result = self.runner.run(&invocation, working_dir, timeout).await;
                artifact.release();
                result
            }
            Payload::ScriptFile(path) => {
                let head = read_head(&path).await?;
                let language = self.materializer.detect_language(&head, Some(&path));
                let invocation = match self.materializer.build_invocation(
                    &path,
                    language,
                    request.env,
                    identity_ref,
                ) {
                    Ok(inv) => inv,
                    Err(e) => return reject(e),
                };
                self.runner.run(&invocation, working_dir, timeout).await
            }
        }
    }

    async fn resolve(
        &self,
        username: &str,
    ) -> Result<(Arc<dyn IdentitySwitcher>, IdentityDescriptor), IdentityError> {
        let switcher = self.identity()?;
        let descriptor = self.user_info(username).await?;
        Ok((switcher, descriptor))
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Command(_) => "command",
        Payload::Script { .. } => "script",
        Payload::ScriptFile(_) => "script_file",
    }
}

/// Request-level identity failures become a failed result; lookup faults
/// propagate.
fn reject(err: IdentityError) -> Result<ExecutionResult, ExecError> {
    if err.is_request_failure() {
        tracing::warn!(error = %err, "Identity switch refused");
        Ok(ExecutionResult::rejected(err.to_string()))
    } else {
        Err(ExecError::Identity(err))
    }
}

/// First bytes of an existing script, or `ScriptNotFound`.
async fn read_head(path: &Path) -> Result<String, ExecError> {
    let not_found = || ExecError::ScriptNotFound(path.to_path_buf());

    let meta = tokio::fs::metadata(path).await.map_err(|_| not_found())?;
    if !meta.is_file() {
        return Err(not_found());
    }

    let file = tokio::fs::File::open(path).await.map_err(ExecError::Io)?;
    let mut head = Vec::new();
    file.take(SHEBANG_PROBE_BYTES)
        .read_to_end(&mut head)
        .await
        .map_err(ExecError::Io)?;
    Ok(String::from_utf8_lossy(&head).into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::time::Instant;

    use assert_matches::assert_matches;

    use super::*;
    use crate::scripting::language::Language;
    use crate::scripting::subprocess::RunnerConfig;

    struct Fixture {
        _root: tempfile::TempDir,
        scripts: PathBuf,
        orchestrator: Orchestrator,
    }

    fn fixture(switcher: Option<Arc<dyn IdentitySwitcher>>) -> Fixture {
        let root = tempfile::tempdir().expect("tempdir");
        let scripts = root.path().join("scripts");
        let runner = ProcessRunner::new(RunnerConfig {
            max_output_bytes: 64 * 1024,
            work_root: root.path().join("work"),
        });
        let materializer = ScriptMaterializer::new(&scripts, Language::Shell);
        Fixture {
            orchestrator: Orchestrator::new(runner, materializer, switcher, Duration::from_secs(30)),
            scripts,
            _root: root,
        }
    }

    fn with_posix() -> Fixture {
        fixture(Some(crate::identity::detect().expect("switcher")))
    }

    fn current_username() -> String {
        nix::unistd::User::from_uid(nix::unistd::getuid())
            .expect("getpwuid")
            .expect("current user has a passwd entry")
            .name
    }

    fn leftover_artifacts(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn command_echo() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(ExecutionRequest::command("echo hello"))
            .await
            .expect("execute");
        assert_eq!(result.output, "hello\n");
        assert_eq!(result.error, "");
        assert_eq!(result.return_code, 0);
        assert!(result.success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_executions_wait_independently() {
        let f = fixture(None);
        let started = Instant::now();
        let (first, second) = tokio::join!(
            f.orchestrator.execute(ExecutionRequest::command("sleep 1")),
            f.orchestrator.execute(ExecutionRequest::command("sleep 1")),
        );
        let elapsed = started.elapsed();

        assert!(first.expect("first").success);
        assert!(second.expect("second").success);
        assert!(elapsed < Duration::from_millis(1800), "ran serially: {elapsed:?}");
    }

    #[tokio::test]
    async fn unknown_user_is_a_failed_result() {
        let f = with_posix();
        let result = f
            .orchestrator
            .execute(ExecutionRequest::command("whoami").with_user(Some("nonexistent_user_xyz".into())))
            .await
            .expect("execute");
        assert!(!result.success);
        assert!(result.error.contains("UserNotFound"), "{}", result.error);
    }

    #[tokio::test]
    async fn running_as_self_needs_no_privileges() {
        let f = with_posix();
        let me = current_username();
        let result = f
            .orchestrator
            .execute(ExecutionRequest::command("id -un").with_user(Some(me.clone())))
            .await
            .expect("execute");
        assert!(result.success, "{result:?}");
        assert_eq!(result.output.trim(), me);
    }

    #[tokio::test]
    async fn user_without_switcher_is_platform_unsupported() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(ExecutionRequest::command("true").with_user(Some("root".into())))
            .await
            .expect("execute");
        assert!(!result.success);
        assert!(result.error.contains("PlatformUnsupported"));
    }

    #[tokio::test]
    async fn script_runs_and_artifact_is_removed() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(ExecutionRequest::script("#!/bin/bash\necho from-script\nexit 3\n", None))
            .await
            .expect("execute");
        assert_eq!(result.output, "from-script\n");
        assert_eq!(result.return_code, 3);
        assert!(!result.success);
        assert_eq!(leftover_artifacts(&f.scripts), 0);
    }

    #[tokio::test]
    async fn timed_out_script_leaves_no_artifact() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(
                ExecutionRequest::script("#!/bin/bash\nsleep 10", None)
                    .with_timeout(Some(Duration::from_secs(1))),
            )
            .await
            .expect("execute");
        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(leftover_artifacts(&f.scripts), 0);
    }

    #[tokio::test]
    async fn explicit_language_overrides_detection() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(ExecutionRequest::script("echo $0", Some(Language::Shell)))
            .await
            .expect("execute");
        assert!(result.output.trim().ends_with("script.sh"), "{}", result.output);
    }

    #[tokio::test]
    async fn script_env_reaches_the_interpreter() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(
                ExecutionRequest::script("echo \"$TARGET\"", None)
                    .with_env(vec![("TARGET".into(), "db-01".into())]),
            )
            .await
            .expect("execute");
        assert_eq!(result.output, "db-01\n");
    }

    #[tokio::test]
    async fn missing_script_file_is_not_found() {
        let f = fixture(None);
        let result = f
            .orchestrator
            .execute(ExecutionRequest::script_file("/nonexistent/job.sh"))
            .await;
        assert_matches!(result, Err(ExecError::ScriptNotFound(p)) if p == Path::new("/nonexistent/job.sh"));
    }

    #[tokio::test]
    async fn existing_script_file_runs_in_place() {
        let f = fixture(None);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("job");
        std::fs::write(&path, "#!/bin/sh\necho on-disk\n").expect("write");

        let result = f
            .orchestrator
            .execute(ExecutionRequest::script_file(&path))
            .await
            .expect("execute");
        assert_eq!(result.output, "on-disk\n");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn validation_happens_before_anything_runs() {
        let f = fixture(None);
        assert_matches!(
            f.orchestrator.execute(ExecutionRequest::command("  ")).await,
            Err(ExecError::Validation(_))
        );
    }

    #[test]
    fn timeout_is_clamped_to_ceiling() {
        let f = fixture(None);
        let o = &f.orchestrator;
        assert_eq!(o.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(o.effective_timeout(Some(Duration::from_secs(5))), Duration::from_secs(5));
        assert_eq!(o.effective_timeout(Some(Duration::from_secs(900))), Duration::from_secs(30));
    }
}
