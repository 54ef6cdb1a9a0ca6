//! # Single-node application state.
//!
//! In-memory per-role flags plus a listener list. The leader lock is granted to the
//! first caller and then refused until [`AppState::reset`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{AppState, Listener};
use crate::process::ProcessRole;

const ROLES: usize = 4;

/// [`AppState`] for a node running outside cluster mode.
pub struct LocalAppState {
    flags: Mutex<[bool; ROLES]>,
    listeners: RwLock<Vec<Listener>>,
    web_leader_locked: AtomicBool,
}

impl Default for LocalAppState {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAppState {
    /// Creates a state where nothing is operational.
    pub fn new() -> Self {
        Self {
            flags: Mutex::new([false; ROLES]),
            listeners: RwLock::new(Vec::new()),
            web_leader_locked: AtomicBool::new(false),
        }
    }

    fn notify(&self, role: ProcessRole) {
        for listener in self.listeners.read().iter() {
            listener(role);
        }
    }
}

#[async_trait]
impl AppState for LocalAppState {
    fn is_operational(&self, role: ProcessRole) -> bool {
        self.flags.lock()[role.index()]
    }

    fn set_operational(&self, role: ProcessRole) {
        let changed = {
            let mut flags = self.flags.lock();
            !std::mem::replace(&mut flags[role.index()], true)
        };
        if changed {
            self.notify(role);
        }
    }

    fn add_listener(&self, listener: Listener) {
        self.listeners.write().push(listener);
    }

    async fn try_acquire_web_leader_lock(&self) -> bool {
        self.web_leader_locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn reset(&self) {
        *self.flags.lock() = [false; ROLES];
        self.web_leader_locked.store(false, Ordering::Release);
    }

    async fn close(&self) {
        self.listeners.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recording(state: &LocalAppState) -> Arc<Mutex<Vec<ProcessRole>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        state.add_listener(Box::new(move |role| sink.lock().push(role)));
        seen
    }

    #[tokio::test]
    async fn test_listener_is_edge_triggered() {
        let state = LocalAppState::new();
        let seen = recording(&state);

        state.set_operational(ProcessRole::Search);
        state.set_operational(ProcessRole::Search);
        state.set_operational(ProcessRole::Web);

        assert_eq!(*seen.lock(), vec![ProcessRole::Search, ProcessRole::Web]);
        assert!(state.is_operational(ProcessRole::Search));
        assert!(!state.is_operational(ProcessRole::Compute));
        assert!(!state.is_operational(ProcessRole::App));
    }

    #[tokio::test]
    async fn test_reset_allows_one_new_notification() {
        let state = LocalAppState::new();
        let seen = recording(&state);

        state.set_operational(ProcessRole::Search);
        state.reset().await;
        assert!(!state.is_operational(ProcessRole::Search));

        state.set_operational(ProcessRole::Search);
        state.set_operational(ProcessRole::Search);
        assert_eq!(*seen.lock(), vec![ProcessRole::Search, ProcessRole::Search]);
    }

    #[tokio::test]
    async fn test_leader_lock_granted_once() {
        let state = LocalAppState::new();
        assert!(state.try_acquire_web_leader_lock().await);
        assert!(!state.try_acquire_web_leader_lock().await);

        state.reset().await;
        assert!(state.try_acquire_web_leader_lock().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_leader_lock_has_exactly_one_winner_among_concurrent_callers() {
        let state = Arc::new(LocalAppState::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = Arc::clone(&state);
            handles.push(tokio::spawn(async move { s.try_acquire_web_leader_lock().await }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
