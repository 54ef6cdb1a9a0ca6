use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lock::LeaderClaim;
use crate::process::ProcessRole;

/// Identity of one supervisor instance in the cluster.
///
/// Regenerated at every start, so a restarted machine is a new member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Key of the replicated operational view: one role hosted on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterProcessKey {
    /// Owning node.
    pub node: NodeId,
    /// Role hosted on that node.
    pub role: ProcessRole,
}

impl ClusterProcessKey {
    /// Builds a key.
    pub fn new(node: NodeId, role: ProcessRole) -> Self {
        Self { node, role }
    }
}

impl fmt::Display for ClusterProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.role)
    }
}

/// The wire protocol between supervisors.
///
/// - `Heartbeat`: full authoritative state of the sender, sent periodically and on change.
/// - `Leave`: the sender is shutting down; drop its keys and claim now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum GossipMessage {
    Heartbeat {
        cluster: String,
        from: NodeId,
        incarnation: u64,
        operational: Vec<ProcessRole>,
        leader_claim: Option<LeaderClaim>,
    },

    Leave {
        cluster: String,
        from: NodeId,
    },
}

impl GossipMessage {
    pub(crate) fn cluster(&self) -> &str {
        match self {
            GossipMessage::Heartbeat { cluster, .. } | GossipMessage::Leave { cluster, .. } => cluster,
        }
    }

    pub(crate) fn from(&self) -> NodeId {
        match self {
            GossipMessage::Heartbeat { from, .. } | GossipMessage::Leave { from, .. } => *from,
        }
    }
}
