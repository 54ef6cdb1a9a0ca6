//! # Handle to one running worker process.
//!
//! A [`ProcessMonitor`] wraps one spawned worker. The scheduler never blocks on it
//! except through [`ProcessMonitor::wait_for_exit`], which is always bounded; everything
//! else is a cheap poll performed by the process watcher at a fixed interval.
//!
//! "Alive" is OS-level liveness; "operational" is the worker's own readiness signal.
//! A process can be alive for a long time before it becomes operational.

use std::time::Duration;

use async_trait::async_trait;

use super::ProcessRole;

/// # Polled view of a spawned worker.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use appvisor::{ProcessMonitor, ProcessRole};
///
/// struct Inline { alive: AtomicBool }
///
/// #[async_trait]
/// impl ProcessMonitor for Inline {
///     fn role(&self) -> ProcessRole { ProcessRole::Search }
///     fn is_alive(&self) -> bool { self.alive.load(Ordering::SeqCst) }
///     fn is_operational(&self) -> bool { true }
///     fn asked_for_restart(&self) -> bool { false }
///     fn acknowledge_restart(&self) {}
///     fn request_graceful_stop(&self) { self.alive.store(false, Ordering::SeqCst) }
///     fn force_stop(&self) { self.alive.store(false, Ordering::SeqCst) }
///     async fn wait_for_exit(&self, _timeout: Duration) -> bool { !self.is_alive() }
/// }
/// ```
#[async_trait]
pub trait ProcessMonitor: Send + Sync + 'static {
    /// Role this process was launched for.
    fn role(&self) -> ProcessRole;

    /// True while the OS process has not exited.
    fn is_alive(&self) -> bool;

    /// True once the worker reported itself ready.
    fn is_operational(&self) -> bool;

    /// True when the worker asked the supervisor for a coordinated restart.
    fn asked_for_restart(&self) -> bool;

    /// Clears the restart request so it is observed only once.
    fn acknowledge_restart(&self);

    /// Asks the worker to shut down on its own terms.
    fn request_graceful_stop(&self);

    /// Kills the worker.
    fn force_stop(&self);

    /// Waits at most `timeout` for the process to exit.
    ///
    /// Returns `true` if the process is gone.
    async fn wait_for_exit(&self, timeout: Duration) -> bool;
}
