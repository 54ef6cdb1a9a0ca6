//! # Application state shared by the scheduler, its watchers and (in cluster mode) peers.
//!
//! [`AppState`] answers "is this role operational?", notifies listeners on every
//! false→true transition, and arbitrates the web leader lock. Two interchangeable
//! implementations are chosen once, at construction:
//!
//! ```text
//! cluster.enabled = false ──► LocalAppState   (in-memory, always leader)
//! cluster.enabled = true  ──► ClusterAppState (gossip-replicated view + leader lock)
//! ```
//!
//! ## Rules
//! - Writes to a role's flag are last-write-wins.
//! - Listeners are edge-triggered: exactly one call per observed false→true transition
//!   of a key, never on a repeated `true`.
//! - Listeners are invoked outside internal locks and must not block.

mod cluster;
mod local;

use std::sync::Arc;

use async_trait::async_trait;

pub use cluster::{ClusterAppState, ClusterProcessKey, ClusterTimings, NodeId};
pub use local::LocalAppState;

use crate::{
    error::StateError,
    process::ProcessRole,
    settings::ClusterConfig,
};

/// Callback invoked with the role that became operational.
pub type Listener = Box<dyn Fn(ProcessRole) + Send + Sync>;

/// Shared operational view and leader election.
#[async_trait]
pub trait AppState: Send + Sync + 'static {
    /// True if `role` is operational (anywhere in the cluster in cluster mode).
    fn is_operational(&self, role: ProcessRole) -> bool;

    /// Marks `role` as operational on this node.
    fn set_operational(&self, role: ProcessRole);

    /// Registers a transition listener.
    fn add_listener(&self, listener: Listener);

    /// Tries to become the web leader.
    ///
    /// At most one caller ever gets `true` until the holder releases the lock (reset,
    /// close or node failure); a second call from the holder returns `false`.
    async fn try_acquire_web_leader_lock(&self) -> bool;

    /// Clears this node's operational flags and releases its leader claim.
    ///
    /// Used between the stop and start phases of a coordinated restart.
    async fn reset(&self);

    /// Releases every resource (sockets, background tasks, claims).
    async fn close(&self);
}

/// Builds the application state matching `config`.
pub async fn build_app_state(config: &ClusterConfig) -> Result<Arc<dyn AppState>, StateError> {
    if config.is_enabled() {
        Ok(Arc::new(ClusterAppState::start(config.clone()).await?))
    } else {
        Ok(Arc::new(LocalAppState::new()))
    }
}
