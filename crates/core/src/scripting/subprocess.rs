//! Process Runner: spawn, capture, time out, reap.
//!
//! [`ProcessRunner::run`] is the only place the agent creates child
//! processes. Every child is started as the leader of its own process group
//! so that a timeout can terminate the whole tree (subshells, background
//! jobs) instead of only the immediate child.
//!
//! A [`GroupGuard`] holds the group for as long as the request is in
//! flight. If the request future is dropped (client disconnect, request
//! timeout) the guard kills the group on its way out.
//!
//! stdout and stderr are drained concurrently into bounded buffers shared
//! with the waiting task, so whatever was captured before a timeout is still
//! returned. Readers keep consuming past the limit to keep the child from
//! blocking on a full pipe; the surplus is discarded and flagged.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::executor::{ExecError, ExecutionResult, SENTINEL_EXIT_CODE};
use super::invocation::{Invocation, TargetAccount};

/// Marker line appended to a stream that exceeded the capture limit.
pub const TRUNCATION_MARKER: &str = "[output truncated]";

/// Time between the polite and the forced group kill on timeout.
const KILL_GRACE: Duration = Duration::from_millis(250);

/// How long stream readers may run after the child exited. Descendants that
/// still hold the pipes open after this are killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

/// Owner has full access, everyone else may only traverse.
#[cfg(unix)]
const WORK_ROOT_MODE: u32 = 0o711;

/// Process Runner settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Per-stream capture limit in bytes.
    pub max_output_bytes: usize,
    /// Parent of the per-request scoped working directories.
    pub work_root: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 1024 * 1024,
            work_root: std::env::temp_dir().join("aiops-agent"),
        }
    }
}

#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Spawns child processes and turns their lifetime into an [`ExecutionResult`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `invocation` to completion or until `timeout` elapses.
    ///
    /// Without `working_dir` the child runs in a fresh directory under the
    /// configured work root, removed once the child is gone.
    pub async fn run(
        &self,
        invocation: &Invocation,
        working_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecError> {
        if invocation.is_empty() {
            return Err(ExecError::Validation("nothing to execute".into()));
        }

        let mut scoped = None;
        let cwd = match working_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| ExecError::WorkingDir {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                dir.to_path_buf()
            }
            None => {
                let tmp = self.scoped_dir(invocation.target.as_ref())?;
                let path = tmp.path().to_path_buf();
                scoped = Some(tmp);
                path
            }
        };

        let result = self.spawn_and_wait(invocation, &cwd, timeout).await;

        if let Some(dir) = scoped {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scoped working directory");
            }
        }

        result
    }

    /// A private directory for one request, owned by the target account when
    /// the agent can arrange that.
    fn scoped_dir(&self, target: Option<&TargetAccount>) -> Result<tempfile::TempDir, ExecError> {
        let root = &self.config.work_root;
        prepare_work_root(root).map_err(|source| ExecError::WorkingDir {
            path: root.clone(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(root)
            .map_err(|source| ExecError::WorkingDir {
                path: root.clone(),
                source,
            })?;

        #[cfg(unix)]
        {
            if let Some(target) = target {
                hand_over_dir(dir.path(), target).map_err(|source| ExecError::WorkingDir {
                    path: dir.path().to_path_buf(),
                    source,
                })?;
            }
        }
        #[cfg(not(unix))]
        let _ = target;

        Ok(dir)
    }

    async fn spawn_and_wait(
        &self,
        invocation: &Invocation,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().cloned())
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
            if let Some(target) = invocation.target.as_ref().filter(|t| t.drop_privileges) {
                if let Some(gid) = target.gid {
                    cmd.gid(gid);
                }
                if let Some(uid) = target.uid {
                    cmd.uid(uid);
                }
            }
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id();
        let mut guard = GroupGuard::new(pid);

        tracing::debug!(
            pid = ?pid,
            command = %invocation,
            cwd = %cwd.display(),
            timeout_secs = timeout.as_secs(),
            "Spawned child process"
        );

        let limit = self.config.max_output_bytes;
        let stdout = SharedCapture::default();
        let stderr = SharedCapture::default();
        let readers = [
            spawn_reader(child.stdout.take(), Arc::clone(&stdout), limit),
            spawn_reader(child.stderr.take(), Arc::clone(&stderr), limit),
        ];

        let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                terminate_tree(&mut child, pid).await;
                guard.disarm();
                abort_readers(readers);
                return Err(ExecError::Io(e));
            }
            Err(_) => {
                tracing::warn!(pid = ?pid, timeout_secs = timeout.as_secs(), "Execution timed out, terminating process group");
                terminate_tree(&mut child, pid).await;
                (None, true)
            }
        };

        let [mut out_task, mut err_task] = readers;
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            let _ = (&mut out_task).await;
            let _ = (&mut err_task).await;
        })
        .await;
        if drained.is_err() {
            tracing::debug!(pid = ?pid, "Descendants still hold output pipes, killing group");
            kill_group(pid);
            abort_readers([out_task, err_task]);
        }
        guard.disarm();

        let duration_ms = start.elapsed().as_millis() as u64;
        let (output, out_truncated) = finish_capture(&stdout);
        let (mut error, err_truncated) = finish_capture(&stderr);

        if timed_out {
            if !error.is_empty() && !error.ends_with('\n') {
                error.push('\n');
            }
            error.push_str(&format!(
                "Execution timed out after {} seconds",
                timeout.as_secs_f64()
            ));
        }

        let return_code = match status {
            Some(status) if !timed_out => exit_code(status),
            _ => SENTINEL_EXIT_CODE,
        };

        tracing::info!(
            pid = ?pid,
            return_code,
            timed_out,
            duration_ms,
            "Child process finished"
        );

        Ok(ExecutionResult {
            output,
            error,
            return_code,
            success: return_code == 0 && !timed_out,
            timed_out,
            truncated: out_truncated || err_truncated,
            duration_ms,
        })
    }
}

/// Kills a child's process group when dropped while still armed.
///
/// Declared after the [`Child`] so it drops first, while the unreaped
/// leader still pins the group id.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pid) = self.pid.take() else { return };
        tracing::warn!(pid, "Execution abandoned, killing process group");
        abandon_tree(pid);
    }
}

#[cfg(unix)]
fn abandon_tree(pid: u32) {
    signal_group(Some(pid), nix::sys::signal::Signal::SIGKILL);
}

#[cfg(windows)]
fn abandon_tree(pid: u32) {
    let spawned = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(e) = spawned {
        tracing::warn!(pid, error = %e, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
fn abandon_tree(_pid: u32) {}

fn spawn_reader<R>(stream: Option<R>, sink: SharedCapture, limit: usize) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else { return };
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let Ok(mut capture) = sink.lock() else { break };
            let room = limit.saturating_sub(capture.buf.len());
            if n > room {
                capture.truncated = true;
            }
            capture.buf.extend_from_slice(&chunk[..n.min(room)]);
        }
    })
}

fn abort_readers(readers: [JoinHandle<()>; 2]) {
    for reader in readers {
        reader.abort();
    }
}

fn finish_capture(capture: &SharedCapture) -> (String, bool) {
    let (mut text, truncated) = match capture.lock() {
        Ok(c) => (String::from_utf8_lossy(&c.buf).into_owned(), c.truncated),
        Err(poisoned) => {
            let c = poisoned.into_inner();
            (String::from_utf8_lossy(&c.buf).into_owned(), c.truncated)
        }
    };
    if truncated {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(TRUNCATION_MARKER);
        text.push('\n');
    }
    (text, truncated)
}

/// Real exit code, or `128 + signal` for a child killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    SENTINEL_EXIT_CODE
}

/// SIGTERM the group, give it [`KILL_GRACE`], SIGKILL the group, reap.
///
/// The unreaped leader keeps the group id reserved until the final wait,
/// so the group signals cannot hit an unrelated group.
#[cfg(unix)]
async fn terminate_tree(child: &mut Child, pid: Option<u32>) {
    use nix::sys::signal::Signal;

    signal_group(pid, Signal::SIGTERM);
    tokio::time::sleep(KILL_GRACE).await;
    signal_group(pid, Signal::SIGKILL);

    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        tracing::warn!(pid = ?pid, error = %e, "Failed to reap timed-out child");
    }
}

#[cfg(windows)]
async fn terminate_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        let killed = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = killed {
            tracing::warn!(pid, error = %e, "taskkill failed");
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(not(any(unix, windows)))]
async fn terminate_tree(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match nix::sys::signal::killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, signal = ?signal, error = %e, "Failed to signal process group"),
    }
}

/// Create the work root. On POSIX it is made traverse-only for other
/// accounts so the random per-request names cannot be listed.
fn prepare_work_root(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(root, std::fs::Permissions::from_mode(WORK_ROOT_MODE))?;
    }
    Ok(())
}

/// Let the target account use a freshly created scoped directory.
#[cfg(unix)]
fn hand_over_dir(dir: &Path, target: &TargetAccount) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    use nix::unistd::{chown, Gid, Uid};

    let owned = chown(
        dir,
        target.uid.map(Uid::from_raw),
        target.gid.map(Gid::from_raw),
    );
    if owned.is_err() {
        // Not privileged to chown (sudo mode): open the random-named dir up instead.
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
