use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tether_types::{LaunchSpec, TetherError, TetherResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::logs::LogWriteLocks;

/// Owned handle to a running target process. Dropping it kills the child.
pub(crate) struct ManagedChild {
    child: Child,
    pid: u32,
}

impl ManagedChild {
    pub fn spawn(
        slug: &str,
        launch: &LaunchSpec,
        log_path: &Path,
        write_locks: &Arc<LogWriteLocks>,
        tracker: &TaskTracker,
    ) -> TetherResult<Self> {
        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &launch.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            TetherError::Process(format!(
                "Failed to spawn '{}' for {}: {}",
                launch.display_command(),
                slug,
                e
            ))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| TetherError::Process(format!("{} exited before reporting a pid", slug)))?;

        if let Some(stdout) = child.stdout.take() {
            tracker.spawn(pump_lines(
                slug.to_string(),
                stdout,
                log_path.to_path_buf(),
                Arc::clone(write_locks),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tracker.spawn(pump_lines(
                slug.to_string(),
                stderr,
                log_path.to_path_buf(),
                Arc::clone(write_locks),
            ));
        }

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn try_wait(&mut self) -> TetherResult<Option<ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| TetherError::Process(format!("Failed to poll pid {}: {}", self.pid, e)))
    }

    /// SIGTERM to the process group, then SIGKILL once `grace` runs out.
    pub async fn terminate(mut self, grace: Duration) -> Option<i32> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return status.code();
        }

        self.signal_group(false);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => return status.code(),
            Ok(Err(e)) => warn!("Failed waiting on pid {}: {}", self.pid, e),
            Err(_) => debug!("pid {} ignored graceful stop for {:?}, killing", self.pid, grace),
        }

        self.signal_group(true);
        if let Err(e) = self.child.kill().await {
            debug!("kill on pid {} failed: {}", self.pid, e);
        }
        self.child.wait().await.ok().and_then(|status| status.code())
    }

    #[cfg(unix)]
    fn signal_group(&mut self, force: bool) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        if let Err(e) = killpg(Pid::from_raw(self.pid as i32), signal) {
            trace!("killpg({}, {:?}) failed: {}", self.pid, signal, e);
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _force: bool) {
        if let Err(e) = self.child.start_kill() {
            trace!("start_kill({}) failed: {}", self.pid, e);
        }
    }
}

async fn pump_lines<R>(slug: String, reader: R, log_path: PathBuf, write_locks: Arc<LogWriteLocks>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(e) = write_locks.append_line(&slug, &log_path, &line).await {
                    warn!("Failed to write log line for {}: {}", slug, e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Output stream for {} closed: {}", slug, e);
                break;
            }
        }
    }
    trace!("Output pump for {} finished", slug);
}
