//! # OS-process launcher backed by `tokio::process`.
//!
//! Workers talk to the supervisor through a per-process status directory:
//!
//! ```text
//! <status_root>/<role>/
//!     operational   created by the worker once it is ready
//!     restart       created by the worker to ask for a coordinated restart
//!     stop          created by the supervisor to ask the worker to stop
//! ```
//!
//! The directory is passed in `APPVISOR_STATUS_DIR`, the role in `APPVISOR_PROCESS`.
//! The directory is wiped before every launch so stale flags never leak into a new
//! process. Forced stop kills the OS process.
//!
//! Flag checks and writes are synchronous `std::fs` calls on the runtime thread: at
//! most one `stat`, `remove` or empty `write` per flag and watcher poll. The status
//! root must be on a local filesystem.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    process::{Child, Command},
    time::{self, Instant},
};

use super::{LaunchSpec, ProcessLauncher, ProcessMonitor, ProcessRole};
use crate::error::LaunchError;

/// Environment variable carrying the status directory.
pub const ENV_STATUS_DIR: &str = "APPVISOR_STATUS_DIR";
/// Environment variable carrying the role key.
pub const ENV_PROCESS: &str = "APPVISOR_PROCESS";

const OPERATIONAL_FILE: &str = "operational";
const RESTART_FILE: &str = "restart";
const STOP_FILE: &str = "stop";

const EXIT_POLL: Duration = Duration::from_millis(50);

/// Spawns workers as child processes.
#[derive(Debug, Clone)]
pub struct ChildLauncher {
    status_root: PathBuf,
}

impl ChildLauncher {
    /// Creates a launcher keeping status directories under `status_root`.
    pub fn new(status_root: impl Into<PathBuf>) -> Self {
        Self {
            status_root: status_root.into(),
        }
    }

    async fn prepare_status_dir(&self, role: ProcessRole) -> Result<PathBuf, LaunchError> {
        let dir = self.status_root.join(role.key());
        let wrap = |source| LaunchError::StatusDir {
            path: dir.clone(),
            source,
        };
        if tokio::fs::try_exists(&dir).await.map_err(wrap)? {
            tokio::fs::remove_dir_all(&dir).await.map_err(wrap)?;
        }
        tokio::fs::create_dir_all(&dir).await.map_err(wrap)?;
        Ok(dir)
    }
}

#[async_trait]
impl ProcessLauncher for ChildLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessMonitor>, LaunchError> {
        let role = spec.role;
        let status_dir = self.prepare_status_dir(role).await?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(ENV_STATUS_DIR, &status_dir)
            .env(ENV_PROCESS, role.key())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|source| LaunchError::Spawn { role, source })?;
        tracing::debug!(%role, pid = ?child.id(), program = %spec.program.display(), "process spawned");

        Ok(Arc::new(ChildMonitor {
            role,
            status_dir,
            child: Mutex::new(child),
            exited: AtomicBool::new(false),
        }))
    }
}

/// [`ProcessMonitor`] over a spawned child process.
#[derive(Debug)]
pub struct ChildMonitor {
    role: ProcessRole,
    status_dir: PathBuf,
    child: Mutex<Child>,
    exited: AtomicBool,
}

impl ChildMonitor {
    /// Status directory shared with the worker.
    pub fn status_dir(&self) -> &Path {
        &self.status_dir
    }

    fn flag(&self, name: &str) -> PathBuf {
        self.status_dir.join(name)
    }

    fn poll_exit(&self) -> bool {
        if self.exited.load(Ordering::Acquire) {
            return true;
        }
        let gone = match self.child.lock().try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(role = %self.role, %status, "process exited");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(role = %self.role, error = %e, "cannot query process status");
                true
            }
        };
        if gone {
            self.exited.store(true, Ordering::Release);
        }
        gone
    }
}

#[async_trait]
impl ProcessMonitor for ChildMonitor {
    fn role(&self) -> ProcessRole {
        self.role
    }

    fn is_alive(&self) -> bool {
        !self.poll_exit()
    }

    fn is_operational(&self) -> bool {
        self.flag(OPERATIONAL_FILE).exists()
    }

    fn asked_for_restart(&self) -> bool {
        self.flag(RESTART_FILE).exists()
    }

    fn acknowledge_restart(&self) {
        if let Err(e) = std::fs::remove_file(self.flag(RESTART_FILE)) {
            tracing::debug!(role = %self.role, error = %e, "restart flag already cleared");
        }
    }

    fn request_graceful_stop(&self) {
        if let Err(e) = std::fs::write(self.flag(STOP_FILE), b"") {
            tracing::warn!(role = %self.role, error = %e, "cannot write stop request");
        }
    }

    fn force_stop(&self) {
        if self.exited.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.child.lock().start_kill() {
            tracing::warn!(role = %self.role, error = %e, "cannot kill process");
        }
    }

    async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.poll_exit() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            time::sleep(EXIT_POLL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}
