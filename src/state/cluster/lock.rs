//! Web leader lock arbitration.
//!
//! Every node advertises its claim (if any) in its heartbeats. A claim is made only
//! when no live peer advertises one; after a settle window the claimant keeps the
//! lock only if no peer holds it and its own claim is the earliest pending one.
//!
//! ```text
//! Idle ──begin──► Acquiring(t) ──settle(won)──► Held(t)
//!  ▲                  │                            │
//!  └───settle(lost)───┘◄─────────release───────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::types::NodeId;

/// Claim as advertised on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LeaderClaim {
    /// Unix time of the claim, in milliseconds.
    pub claimed_at: u64,
    /// True once the claimant has settled and owns the lock.
    pub held: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum LeaderLock {
    #[default]
    Idle,
    Acquiring(u64),
    Held(u64),
}

impl LeaderLock {
    pub(crate) fn claim(&self) -> Option<LeaderClaim> {
        match *self {
            LeaderLock::Idle => None,
            LeaderLock::Acquiring(claimed_at) => Some(LeaderClaim {
                claimed_at,
                held: false,
            }),
            LeaderLock::Held(claimed_at) => Some(LeaderClaim {
                claimed_at,
                held: true,
            }),
        }
    }

    pub(crate) fn is_held(&self) -> bool {
        matches!(self, LeaderLock::Held(_))
    }

    /// Starts a claim; refused unless idle.
    pub(crate) fn begin(&mut self, now_ms: u64) -> bool {
        if *self != LeaderLock::Idle {
            return false;
        }
        *self = LeaderLock::Acquiring(now_ms);
        true
    }

    /// Resolves a pending claim against the claims of live peers.
    pub(crate) fn settle<I>(&mut self, me: NodeId, remote: I) -> bool
    where
        I: IntoIterator<Item = (NodeId, LeaderClaim)>,
    {
        let LeaderLock::Acquiring(at) = *self else {
            return false;
        };
        let won = remote
            .into_iter()
            .all(|(node, claim)| !claim.held && (at, me) < (claim.claimed_at, node));
        *self = if won { LeaderLock::Held(at) } else { LeaderLock::Idle };
        won
    }

    /// Drops any claim. Returns true if there was one.
    pub(crate) fn release(&mut self) -> bool {
        std::mem::take(self) != LeaderLock::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(at: u64) -> LeaderClaim {
        LeaderClaim {
            claimed_at: at,
            held: false,
        }
    }

    #[test]
    fn test_uncontested_claim_wins() {
        let mut lock = LeaderLock::default();
        assert!(lock.claim().is_none());
        assert!(lock.begin(10));
        assert!(!lock.begin(11));
        assert_eq!(lock.claim(), Some(pending(10)));

        assert!(lock.settle(NodeId::new(), []));
        assert!(lock.is_held());
        assert_eq!(lock.claim().map(|c| c.held), Some(true));
        assert!(!lock.begin(12));
    }

    #[test]
    fn test_earliest_claim_wins() {
        let (a, b) = (NodeId::new(), NodeId::new());

        let mut early = LeaderLock::default();
        early.begin(10);
        let mut late = LeaderLock::default();
        late.begin(20);

        assert!(early.settle(a, [(b, pending(20))]));
        assert!(!late.settle(b, [(a, pending(10))]));
        assert_eq!(late, LeaderLock::Idle);
    }

    #[test]
    fn test_equal_timestamps_break_on_node_id() {
        let (a, b) = (NodeId::new(), NodeId::new());
        let (low, high) = if a < b { (a, b) } else { (b, a) };

        let mut l = LeaderLock::default();
        l.begin(5);
        let mut h = LeaderLock::default();
        h.begin(5);

        assert!(l.settle(low, [(high, pending(5))]));
        assert!(!h.settle(high, [(low, pending(5))]));
    }

    #[test]
    fn test_held_remote_claim_always_wins() {
        let mut lock = LeaderLock::default();
        lock.begin(1);
        let held = LeaderClaim {
            claimed_at: 100,
            held: true,
        };
        assert!(!lock.settle(NodeId::new(), [(NodeId::new(), held)]));
    }

    #[test]
    fn test_release() {
        let mut lock = LeaderLock::default();
        assert!(!lock.release());
        lock.begin(1);
        lock.settle(NodeId::new(), []);
        assert!(lock.release());
        assert!(lock.begin(2));
    }
}
