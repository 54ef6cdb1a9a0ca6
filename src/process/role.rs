//! # Process roles and their dependency order.
//!
//! The supervisor manages a fixed set of roles. Their declaration order is the
//! startup dependency order:
//!
//! ```text
//! Search ──► Web ──► Compute
//! ```
//!
//! Startup follows this order, shutdown is always the exact reverse of the order in
//! which processes were actually started. [`ProcessRole::App`] is the supervisor itself
//! and is never launched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of process known to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessRole {
    /// The supervisor process itself (not managed).
    App,
    /// Search node; has no predecessor.
    Search,
    /// Web node; depends on search.
    Web,
    /// Compute node; depends on web.
    Compute,
}

impl ProcessRole {
    /// Managed roles in dependency order.
    pub const MANAGED: [ProcessRole; 3] = [ProcessRole::Search, ProcessRole::Web, ProcessRole::Compute];

    /// Stable lowercase key used in property names, status files and logs.
    pub fn key(self) -> &'static str {
        match self {
            ProcessRole::App => "app",
            ProcessRole::Search => "search",
            ProcessRole::Web => "web",
            ProcessRole::Compute => "compute",
        }
    }

    /// True for roles the scheduler launches.
    #[inline]
    pub fn is_managed(self) -> bool {
        !matches!(self, ProcessRole::App)
    }

    /// Dense index, usable for fixed-size per-role tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Managed roles that must be operational before `self` may start.
    pub fn predecessors(self) -> &'static [ProcessRole] {
        match self {
            ProcessRole::App | ProcessRole::Search => &[],
            ProcessRole::Web => &ProcessRole::MANAGED[..1],
            ProcessRole::Compute => &ProcessRole::MANAGED[..2],
        }
    }

    /// Filters `roles` down to managed roles, deduplicated and in dependency order.
    pub fn ordered(roles: &[ProcessRole]) -> Vec<ProcessRole> {
        ProcessRole::MANAGED
            .iter()
            .copied()
            .filter(|r| roles.contains(r))
            .collect()
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
