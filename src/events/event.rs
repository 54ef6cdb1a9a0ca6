//! # Runtime events emitted by the scheduler and process watchers.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Scheduler lifecycle**: scheduled, restart, stop requests, terminal state
//! - **Process lifecycle**: starting, operational, died, stopping, stopped
//! - **Configuration**: reload outcome on restart
//! - **Subscriber health**: overflow and panic of event subscribers
//!
//! [`Event`] carries the metadata relevant to its kind (role, reason, start cycle,
//! timeouts).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use appvisor::{Event, EventKind, ProcessRole};
//!
//! let ev = Event::new(EventKind::ProcessDied)
//!     .with_role(ProcessRole::Web)
//!     .with_reason("exited")
//!     .with_generation(2);
//!
//! assert_eq!(ev.kind, EventKind::ProcessDied);
//! assert_eq!(ev.role, Some(ProcessRole::Web));
//! assert_eq!(ev.reason.as_deref(), Some("exited"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::process::ProcessRole;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `source` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `source` (subscriber name) and `reason` (`full` or `closed`).
    SubscriberOverflow,

    // === Scheduler lifecycle ===
    /// `schedule()` accepted; sets `generation`.
    Scheduled,

    /// Stop requested from outside (terminate, OS signal, stop file).
    ///
    /// Sets `reason` when the requester named itself (`terminate_with_reason`).
    ShutdownRequested,

    /// Scheduler entered `Stopping`; sets `reason` (stop cause).
    SchedulerStopping,

    /// A coordinated restart begins; sets `role` (requester) and `generation`.
    RestartRequested,

    /// Configuration reloaded during a restart.
    ConfigReloaded,

    /// Reload failed or changed an immutable property; sets `reason`.
    ConfigReloadFailed,

    /// Scheduler reached its terminal state; sets `reason` (stop cause).
    SchedulerStopped,

    // === Process lifecycle ===
    /// Process about to be launched.
    ///
    /// Sets `role`, `generation`, and `leader` for the web role.
    ProcessStarting,

    /// Process launched and being watched; sets `role` and `generation`.
    ProcessStarted,

    /// Launch failed; sets `role`, `generation` and `reason`.
    ProcessLaunchFailed,

    /// Process reported readiness for the first time; sets `role` and `generation`.
    ProcessOperational,

    /// Process exited while it was expected to run; sets `role` and `generation`.
    ProcessDied,

    /// Graceful stop requested; sets `role` and `timeout_ms` (grace period).
    ProcessStopping,

    /// Grace period exceeded, process is being killed; sets `role`.
    ProcessStopForced,

    /// Process is gone; sets `role`.
    ProcessStopped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Process role, if applicable.
    pub role: Option<ProcessRole>,
    /// Start cycle the event belongs to (bumped by each restart).
    pub generation: Option<u64>,
    /// Human-readable reason (errors, stop cause, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Emitting component for subscriber events.
    pub source: Option<&'static str>,
    /// Web leader outcome (only for `ProcessStarting` of the web role).
    pub leader: Option<bool>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            role: None,
            generation: None,
            reason: None,
            source: None,
            leader: None,
            timeout_ms: None,
        }
    }

    /// Attaches a process role.
    #[inline]
    pub fn with_role(mut self, role: ProcessRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Attaches a start cycle number.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the web leader outcome.
    #[inline]
    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = Some(leader);
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.source = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.source = Some(subscriber);
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::Scheduled);
        let b = Event::new(EventKind::Scheduled);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders() {
        let ev = Event::new(EventKind::ProcessStopping)
            .with_role(ProcessRole::Compute)
            .with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.role, Some(ProcessRole::Compute));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));

        let ev = Event::subscriber_overflow("log", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.source, Some("log"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=log reason=full"));
    }
}
