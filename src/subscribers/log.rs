//! # LogWriter: events rendered through `tracing`
//!
//! Maps every [`Event`] to one `tracing` record so the supervisor's lifecycle shows up
//! in whatever subscriber the host installed (the `appvisor` binary installs
//! `tracing-subscriber` with an `EnvFilter`).
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO appvisor::events: process starting role=search generation=1
//! INFO appvisor::events: process operational role=search generation=1
//! WARN appvisor::events: process died role=web generation=1
//! INFO appvisor::events: stopping process role=compute grace_ms=60000
//! WARN appvisor::events: grace period exceeded, killing process role=compute
//! INFO appvisor::events: scheduler stopped reason=process web died
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "appvisor::events";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let role = e.role.map(|r| r.key()).unwrap_or("-");
        let generation = e.generation.unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::Scheduled => {
                tracing::info!(target: TARGET, generation, "scheduler started");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: TARGET, reason, "shutdown requested");
            }
            EventKind::RestartRequested => {
                tracing::info!(target: TARGET, role, generation, "restart requested");
            }
            EventKind::ConfigReloaded => {
                tracing::info!(target: TARGET, "configuration reloaded");
            }
            EventKind::ConfigReloadFailed => {
                tracing::error!(target: TARGET, reason, "configuration reload failed");
            }
            EventKind::SchedulerStopping => {
                tracing::info!(target: TARGET, reason, "stopping every process");
            }
            EventKind::SchedulerStopped => {
                tracing::info!(target: TARGET, reason, "scheduler stopped");
            }
            EventKind::ProcessStarting => match e.leader {
                Some(leader) => tracing::info!(target: TARGET, role, generation, leader, "process starting"),
                None => tracing::info!(target: TARGET, role, generation, "process starting"),
            },
            EventKind::ProcessStarted => {
                tracing::debug!(target: TARGET, role, generation, "process launched");
            }
            EventKind::ProcessLaunchFailed => {
                tracing::error!(target: TARGET, role, generation, reason, "process launch failed");
            }
            EventKind::ProcessOperational => {
                tracing::info!(target: TARGET, role, generation, "process operational");
            }
            EventKind::ProcessDied => {
                tracing::warn!(target: TARGET, role, generation, "process died");
            }
            EventKind::ProcessStopping => {
                let grace_ms = e.timeout_ms.unwrap_or_default();
                tracing::info!(target: TARGET, role, grace_ms, "stopping process");
            }
            EventKind::ProcessStopForced => {
                tracing::warn!(target: TARGET, role, "grace period exceeded, killing process");
            }
            EventKind::ProcessStopped => {
                tracing::info!(target: TARGET, role, "process stopped");
            }
            EventKind::SubscriberOverflow => {
                let subscriber = e.source.unwrap_or("unknown");
                tracing::warn!(target: TARGET, subscriber, reason, "subscriber dropped an event");
            }
            EventKind::SubscriberPanicked => {
                let subscriber = e.source.unwrap_or("unknown");
                tracing::error!(target: TARGET, subscriber, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
