//! # ProcessWatcher: polling loop over one running process.
//!
//! One watcher runs per launched process. It never changes scheduler state itself:
//! it reports what it observes through the control channel and lets the scheduler
//! react under its single lock.
//!
//! ```text
//! loop {
//!   ├─► cancelled?            → exit (stop in progress)
//!   ├─► !is_alive()           → publish ProcessDied, send Died, exit
//!   ├─► first is_operational  → publish ProcessOperational, AppState::set_operational
//!   ├─► asked_for_restart()   → acknowledge, send RestartRequested
//!   └─► sleep(interval) | cancelled
//! }
//! ```
//!
//! ## Rules
//! - Death is only reported while the watcher token is live: the scheduler cancels
//!   watcher tokens before stopping processes, so planned stops are never reported.
//! - Readiness is published once per launch; the application state decides whether
//!   it is a new transition for listeners.

use std::{sync::Arc, time::Duration};

use tokio::{select, sync::mpsc, time};
use tokio_util::sync::CancellationToken;

use crate::{
    events::{Bus, Event, EventKind},
    process::{ProcessMonitor, ProcessRole},
    state::AppState,
};

/// What watchers and the application state tell the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// A role became operational somewhere (local or remote).
    Operational(ProcessRole),
    /// A process exited unexpectedly.
    Died { role: ProcessRole, generation: u64 },
    /// A process asked for a coordinated restart.
    RestartRequested { role: ProcessRole, generation: u64 },
}

pub(crate) struct ProcessWatcher {
    monitor: Arc<dyn ProcessMonitor>,
    state: Arc<dyn AppState>,
    bus: Bus,
    signals: mpsc::UnboundedSender<Signal>,
    interval: Duration,
    generation: u64,
}

impl ProcessWatcher {
    pub(crate) fn new(
        monitor: Arc<dyn ProcessMonitor>,
        state: Arc<dyn AppState>,
        bus: Bus,
        signals: mpsc::UnboundedSender<Signal>,
        interval: Duration,
        generation: u64,
    ) -> Self {
        Self {
            monitor,
            state,
            bus,
            signals,
            interval,
            generation,
        }
    }

    pub(crate) async fn run(self, token: CancellationToken) {
        let role = self.monitor.role();
        let generation = self.generation;
        let mut operational = false;

        loop {
            if token.is_cancelled() {
                break;
            }
            if !self.monitor.is_alive() {
                if token.is_cancelled() {
                    break;
                }
                self.bus.publish(
                    Event::new(EventKind::ProcessDied)
                        .with_role(role)
                        .with_generation(generation),
                );
                let _ = self.signals.send(Signal::Died { role, generation });
                break;
            }
            if !operational && self.monitor.is_operational() {
                operational = true;
                self.bus.publish(
                    Event::new(EventKind::ProcessOperational)
                        .with_role(role)
                        .with_generation(generation),
                );
                self.state.set_operational(role);
            }
            if self.monitor.asked_for_restart() {
                self.monitor.acknowledge_restart();
                let _ = self.signals.send(Signal::RestartRequested { role, generation });
            }

            select! {
                _ = token.cancelled() => break,
                _ = time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::state::LocalAppState;

    #[derive(Default)]
    struct Flags {
        dead: AtomicBool,
        operational: AtomicBool,
        restart: AtomicBool,
    }

    #[async_trait]
    impl ProcessMonitor for Flags {
        fn role(&self) -> ProcessRole {
            ProcessRole::Web
        }
        fn is_alive(&self) -> bool {
            !self.dead.load(Ordering::SeqCst)
        }
        fn is_operational(&self) -> bool {
            self.operational.load(Ordering::SeqCst)
        }
        fn asked_for_restart(&self) -> bool {
            self.restart.load(Ordering::SeqCst)
        }
        fn acknowledge_restart(&self) {
            self.restart.store(false, Ordering::SeqCst);
        }
        fn request_graceful_stop(&self) {
            self.dead.store(true, Ordering::SeqCst);
        }
        fn force_stop(&self) {
            self.dead.store(true, Ordering::SeqCst);
        }
        async fn wait_for_exit(&self, _timeout: Duration) -> bool {
            !self.is_alive()
        }
    }

    fn spawn(
        flags: &Arc<Flags>,
        state: &Arc<LocalAppState>,
    ) -> (
        mpsc::UnboundedReceiver<Signal>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let watcher = ProcessWatcher::new(
            flags.clone(),
            state.clone(),
            Bus::new(16),
            tx,
            Duration::from_millis(1),
            7,
        );
        let handle = tokio::spawn(watcher.run(token.clone()));
        (rx, token, handle)
    }

    #[tokio::test]
    async fn test_reports_operational_restart_and_death() {
        let flags = Arc::new(Flags::default());
        let state = Arc::new(LocalAppState::new());
        let (mut rx, _token, handle) = spawn(&flags, &state);

        flags.operational.store(true, Ordering::SeqCst);
        flags.restart.store(true, Ordering::SeqCst);
        assert_eq!(
            rx.recv().await,
            Some(Signal::RestartRequested {
                role: ProcessRole::Web,
                generation: 7
            })
        );
        assert!(state.is_operational(ProcessRole::Web));
        assert!(!flags.asked_for_restart());

        flags.dead.store(true, Ordering::SeqCst);
        assert_eq!(
            rx.recv().await,
            Some(Signal::Died {
                role: ProcessRole::Web,
                generation: 7
            })
        );
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_planned_stop_is_not_reported() {
        let flags = Arc::new(Flags::default());
        let state = Arc::new(LocalAppState::new());
        let (mut rx, token, handle) = spawn(&flags, &state);

        token.cancel();
        flags.request_graceful_stop();
        handle.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
