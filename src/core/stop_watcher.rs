//! # StopWatcher: turns out-of-band stop requests into `terminate()`.
//!
//! The scheduler does not know how a stop is requested. The watcher observes:
//! - OS termination signals (see `shutdown.rs`);
//! - a stop-request file, written by `appvisor stop` (or anything else) in the
//!   temporary directory.
//!
//! Whichever comes first triggers [`Scheduler::terminate_with_reason`], naming the
//! signal or the stop file. The watcher exits on its own once the scheduler is
//! stopped.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{Scheduler, shutdown};

/// File name of the stop request, relative to `path.temp`.
pub const STOP_FILE_NAME: &str = "appvisor.stop";

/// Location of the stop request for a given temporary directory.
pub fn stop_file(temp_dir: &Path) -> PathBuf {
    temp_dir.join(STOP_FILE_NAME)
}

/// Asks the supervisor using `temp_dir` to stop.
pub fn request_stop(temp_dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(temp_dir)?;
    let path = stop_file(temp_dir);
    std::fs::write(&path, b"stop")?;
    Ok(path)
}

/// Watches for stop requests on behalf of a [`Scheduler`].
pub struct StopWatcher {
    scheduler: Scheduler,
    stop_file: Option<PathBuf>,
    os_signals: bool,
    poll: Duration,
}

impl StopWatcher {
    /// Watches OS signals only.
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            stop_file: None,
            os_signals: true,
            poll: Duration::from_millis(500),
        }
    }

    /// Also watches the stop file of `temp_dir`. A stale file is removed first.
    pub fn with_stop_file_in(mut self, temp_dir: &Path) -> Self {
        let path = stop_file(temp_dir);
        if let Err(e) = std::fs::remove_file(&path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "cannot remove stale stop file");
        }
        self.stop_file = Some(path);
        self
    }

    /// Turns OS signal handling on or off.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    /// Stop file polling period.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Runs the watcher in the background.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let signal = async {
            if !self.os_signals {
                return std::future::pending().await;
            }
            match shutdown::wait_for_shutdown_signal().await {
                Ok(name) => name,
                Err(e) => {
                    warn!(error = %e, "cannot listen to OS signals");
                    std::future::pending().await
                }
            }
        };
        let file = watch_file(self.stop_file.as_deref(), self.poll);

        let reason = tokio::select! {
            name = signal => name,
            _ = file => "stop file",
            _ = self.scheduler.await_termination() => return,
        };
        info!(reason, "stop requested");
        self.scheduler.terminate_with_reason(reason).await;
    }
}

async fn watch_file(path: Option<&Path>, poll: Duration) {
    let Some(path) = path else {
        return std::future::pending().await;
    };
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "cannot remove stop file");
            }
            return;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp");
        let path = request_stop(&temp).unwrap();
        assert_eq!(path, temp.join(STOP_FILE_NAME));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_watch_file_consumes_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = request_stop(dir.path()).unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            watch_file(Some(&path), Duration::from_millis(5)),
        )
        .await
        .unwrap();
        assert!(!path.exists());
    }
}
