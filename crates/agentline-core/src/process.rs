//! Spawning backend subprocesses and shutting them down.
//!
//! [`spawn_backend`] turns a configured [`Backend`] plus a prompt into a
//! running [`Child`] whose environment is exactly what the backend built.
//! [`terminate`] and [`reap`] release a child: SIGTERM first, SIGKILL after
//! a grace period.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError};

/// Errors that can occur while spawning a backend.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("backend '{backend}' produced an empty command")]
    EmptyCommand { backend: String },

    #[error("failed to spawn '{binary}' -- is it installed and on PATH?")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

/// What to run.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    /// Prompt passed to the tool.
    pub prompt: String,
    /// Continue this session instead of starting a new one.
    pub resume_session: Option<String>,
    /// Working directory for the child; inherits ours when `None`.
    pub working_dir: Option<PathBuf>,
}

impl SpawnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Spawn the backend's tool for `request`.
///
/// The child gets a cleared environment replaced by [`Backend::build_env`],
/// a null stdin, a piped stdout and a null stderr. It is killed if the
/// returned handle is dropped.
pub fn spawn_backend(backend: &dyn Backend, request: &SpawnRequest) -> Result<Child, SpawnError> {
    let argv = match request.resume_session.as_deref() {
        Some(session_id) => backend.build_resume_command(&request.prompt, session_id)?,
        None => backend.build_command(&request.prompt)?,
    };
    let vars = backend.build_env()?;

    let Some((binary, args)) = argv.split_first() else {
        return Err(SpawnError::EmptyCommand {
            backend: backend.name().to_string(),
        });
    };

    let mut cmd = Command::new(binary);
    cmd.args(args)
        .env_clear()
        .envs(&vars)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = &request.working_dir {
        cmd.current_dir(dir);
    }

    debug!(backend = backend.name(), ?argv, "built backend command");
    let child = cmd.spawn().map_err(|source| SpawnError::Spawn {
        binary: binary.clone(),
        source,
    })?;

    info!(
        backend = backend.name(),
        pid = child.id(),
        resume = request.resume_session.is_some(),
        "spawned backend"
    );
    Ok(child)
}

/// Wait up to `grace` for the child to exit on its own, then terminate it.
pub async fn reap(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            warn!(error = %e, "error waiting for child; terminating");
            terminate(child, grace).await
        }
        Err(_elapsed) => {
            debug!(pid = child.id(), "child still running after stream ended; terminating");
            terminate(child, grace).await
        }
    }
}

/// Terminate the child: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// Always reaps the child, so it is gone from the process table when this
/// returns. Returns the exit status when one could be collected.
pub async fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match child.try_wait() {
        Ok(Some(status)) => return Some(status),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "error checking child status"),
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            // SAFETY: pid belongs to a child we spawned and have not yet reaped.
            let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
            if ret != 0 {
                warn!(pid, "SIGTERM failed, proceeding to SIGKILL");
            }
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("child exited after SIGTERM");
            return Some(status);
        }
        Ok(Err(e)) => warn!(error = %e, "error waiting for child after SIGTERM"),
        Err(_elapsed) => debug!("child ignored SIGTERM, sending SIGKILL"),
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill child");
    }
    child.wait().await.ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::{AuthMode, ClaudeBackend};
    use agentline_test_utils::FakeCli;
    use tokio::io::AsyncReadExt;

    fn configured_claude(binary: &str) -> ClaudeBackend {
        let mut backend = ClaudeBackend::with_binary(binary);
        backend.set_auth_mode(AuthMode::Subscription);
        backend
    }

    #[tokio::test]
    async fn spawn_passes_argv_to_the_binary() {
        let cli = FakeCli::new("claude", "printf '%s\\n' \"$@\"\n");
        let backend = configured_claude(cli.path_str());

        let mut child = spawn_backend(&backend, &SpawnRequest::new("hello there")).unwrap();
        let mut out = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        child.wait().await.unwrap();

        let args: Vec<&str> = out.lines().collect();
        assert_eq!(
            args,
            vec!["-p", "--output-format", "stream-json", "--verbose", "--", "hello there"]
        );
    }

    #[tokio::test]
    async fn spawn_uses_resume_command_when_requested() {
        let cli = FakeCli::new("claude", "printf '%s\\n' \"$@\"\n");
        let backend = configured_claude(cli.path_str());
        let request = SpawnRequest {
            resume_session: Some("sess-9".to_string()),
            ..SpawnRequest::new("again")
        };

        let mut child = spawn_backend(&backend, &request).unwrap();
        let mut out = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        child.wait().await.unwrap();
        assert!(out.lines().any(|l| l == "sess-9"));
    }

    #[tokio::test]
    async fn spawn_sets_working_directory() {
        let cli = FakeCli::new("claude", "pwd\n");
        let backend = configured_claude(cli.path_str());
        let work_dir = cli.dir().join("workdir");
        std::fs::create_dir(&work_dir).unwrap();
        let request = SpawnRequest {
            working_dir: Some(work_dir.clone()),
            ..SpawnRequest::new("x")
        };

        let mut child = spawn_backend(&backend, &request).unwrap();
        let mut out = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        child.wait().await.unwrap();

        let reported = PathBuf::from(out.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            work_dir.canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn spawn_without_auth_mode_fails_before_spawning() {
        let backend = ClaudeBackend::with_binary("/nonexistent/claude");
        let err = spawn_backend(&backend, &SpawnRequest::new("x")).unwrap_err();
        assert!(matches!(
            err,
            SpawnError::Backend(BackendError::AuthModeNotSet { .. })
        ));
    }

    #[tokio::test]
    async fn spawn_missing_binary_reports_path() {
        let backend = configured_claude("/nonexistent/path/to/claude");
        let err = spawn_backend(&backend, &SpawnRequest::new("x")).unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/path/to/claude"));
    }

    #[tokio::test]
    async fn terminate_stops_a_sleeping_child() {
        let cli = FakeCli::new("claude", "exec sleep 3600\n");
        let backend = configured_claude(cli.path_str());
        let mut child = spawn_backend(&backend, &SpawnRequest::new("x")).unwrap();

        let status = terminate(&mut child, Duration::from_secs(2)).await;
        assert!(status.is_some());
        assert!(!status.unwrap().success());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn terminate_escalates_when_sigterm_is_ignored() {
        let cli = FakeCli::new("claude", "trap '' TERM\nwhile true; do sleep 1; done\n");
        let backend = configured_claude(cli.path_str());
        let mut child = spawn_backend(&backend, &SpawnRequest::new("x")).unwrap();
        // Give the shell time to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = terminate(&mut child, Duration::from_millis(300)).await;
        assert!(status.is_some());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn reap_collects_status_of_exited_child() {
        let cli = FakeCli::new("claude", "exit 3\n");
        let backend = configured_claude(cli.path_str());
        let mut child = spawn_backend(&backend, &SpawnRequest::new("x")).unwrap();

        let status = reap(&mut child, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
