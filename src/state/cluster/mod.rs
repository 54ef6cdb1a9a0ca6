//! # Cluster-wide application state.
//!
//! Supervisors sharing a cluster name gossip heartbeats over UDP. Each heartbeat is the
//! sender's full authoritative state: its operational roles, its incarnation and its
//! web leader claim. Receivers fold them into a [`ReplicatedView`](view::ReplicatedView)
//! keyed by [`ClusterProcessKey`].
//!
//! ```text
//! set_operational ─► LocalNode ─► heartbeat ─► UDP ─► peer.view.apply ─► listeners
//!                                    ▲
//!                 gossip_loop ───────┘ (period + jitter, or on change)
//! failure_detection_loop ─► view.expire ─► keys and claim of silent peers dropped
//! ```
//!
//! ## Rules
//! - A node only ever writes its own keys.
//! - A peer silent for longer than the dead timeout is removed; a crashed leader's
//!   lock therefore becomes acquirable again after a bounded delay.
//! - `close()` announces the departure so peers release immediately.

mod lock;
mod service;
mod types;
mod view;

pub use service::{ClusterAppState, ClusterTimings};
pub use types::{ClusterProcessKey, NodeId};
