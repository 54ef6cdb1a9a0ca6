//! Replicated view of `(node, role) -> operational` contributed by remote peers.
//!
//! Each peer is authoritative for its own keys and sends its complete state in every
//! heartbeat, so applying a heartbeat replaces that peer's entry. A higher
//! incarnation means the peer reset its flags in between: every role it reports is
//! then a fresh false→true transition, even if the previous heartbeat had it too.

use std::{
    collections::BTreeSet,
    net::SocketAddr,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};

use super::{
    lock::LeaderClaim,
    types::{ClusterProcessKey, NodeId},
};
use crate::process::ProcessRole;

#[derive(Debug, Clone)]
pub(crate) struct Peer {
    pub addr: SocketAddr,
    pub incarnation: u64,
    pub operational: BTreeSet<ProcessRole>,
    pub claim: Option<LeaderClaim>,
    pub last_seen: Instant,
}

/// State received from a peer.
pub(crate) struct Heartbeat<'a> {
    pub from: NodeId,
    pub addr: SocketAddr,
    pub incarnation: u64,
    pub operational: &'a [ProcessRole],
    pub claim: Option<LeaderClaim>,
}

/// Outcome of applying a heartbeat.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Applied {
    /// The sender was unknown until now.
    pub discovered: bool,
    /// Roles whose key went false→true.
    pub raised: Vec<ProcessRole>,
}

#[derive(Debug, Default)]
pub(crate) struct ReplicatedView {
    peers: DashMap<NodeId, Peer>,
    departed: DashMap<NodeId, Instant>,
}

impl ReplicatedView {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply(&self, hb: Heartbeat<'_>, now: Instant) -> Applied {
        if self.departed.contains_key(&hb.from) {
            return Applied::default();
        }
        let reported: BTreeSet<ProcessRole> = hb.operational.iter().copied().collect();
        match self.peers.entry(hb.from) {
            Entry::Occupied(mut e) => {
                let peer = e.get_mut();
                if hb.incarnation < peer.incarnation {
                    return Applied::default();
                }
                let fresh = hb.incarnation > peer.incarnation;
                let raised = reported
                    .iter()
                    .copied()
                    .filter(|r| fresh || !peer.operational.contains(r))
                    .collect();
                peer.addr = hb.addr;
                peer.incarnation = hb.incarnation;
                peer.operational = reported;
                peer.claim = hb.claim;
                peer.last_seen = now;
                Applied {
                    discovered: false,
                    raised,
                }
            }
            Entry::Vacant(e) => {
                let raised = reported.iter().copied().collect();
                e.insert(Peer {
                    addr: hb.addr,
                    incarnation: hb.incarnation,
                    operational: reported,
                    claim: hb.claim,
                    last_seen: now,
                });
                Applied {
                    discovered: true,
                    raised,
                }
            }
        }
    }

    /// Drops a peer that announced its departure. Late heartbeats from it are ignored.
    pub(crate) fn depart(&self, node: NodeId, now: Instant) -> bool {
        self.departed.insert(node, now);
        self.peers.remove(&node).is_some()
    }

    /// Drops peers not heard from within `dead_timeout`.
    pub(crate) fn expire(&self, now: Instant, dead_timeout: Duration) -> Vec<NodeId> {
        let dead: Vec<NodeId> = self
            .peers
            .iter()
            .filter(|e| now.saturating_duration_since(e.value().last_seen) > dead_timeout)
            .map(|e| *e.key())
            .collect();
        for node in &dead {
            self.peers.remove(node);
        }
        self.departed
            .retain(|_, at| now.saturating_duration_since(*at) <= dead_timeout);
        dead
    }

    /// True if any peer reports `role` operational.
    pub(crate) fn any_operational(&self, role: ProcessRole) -> bool {
        self.peers.iter().any(|e| e.value().operational.contains(&role))
    }

    pub(crate) fn get(&self, key: ClusterProcessKey) -> bool {
        self.peers
            .get(&key.node)
            .is_some_and(|p| p.operational.contains(&key.role))
    }

    pub(crate) fn keys(&self) -> Vec<ClusterProcessKey> {
        let mut keys: Vec<ClusterProcessKey> = self
            .peers
            .iter()
            .flat_map(|e| {
                let node = *e.key();
                e.value()
                    .operational
                    .iter()
                    .map(move |role| ClusterProcessKey::new(node, *role))
                    .collect::<Vec<_>>()
            })
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn claims(&self) -> Vec<(NodeId, LeaderClaim)> {
        self.peers
            .iter()
            .filter_map(|e| e.value().claim.map(|c| (*e.key(), c)))
            .collect()
    }

    pub(crate) fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|e| e.value().addr).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }
}
