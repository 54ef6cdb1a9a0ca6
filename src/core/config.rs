//! # Scheduler configuration.
//!
//! [`SchedulerConfig`] holds the timings of the scheduler runtime: how often each
//! process watcher polls its process, how long a graceful stop may take before the
//! process is killed, and the event bus capacity.
//!
//! It is built either from [`Default`] or from properties with
//! [`SchedulerConfig::from_props`].
//!
//! ## Sentinel values
//! - `stop_timeout = 0s` → no grace period, processes are killed right after the
//!   stop request.

use std::time::Duration;

use crate::{
    error::ConfigError,
    settings::{Props, keys},
};

/// Runtime settings of the [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Delay between two polls of a process (liveness, readiness, restart request).
    pub watcher_interval: Duration,

    /// Grace period between the graceful stop request and the forced stop.
    pub stop_timeout: Duration,

    /// Bounded wait for a process to vanish after it has been killed.
    pub force_wait: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Minimum value is 1 (enforced by the bus).
    pub bus_capacity: usize,
}

impl SchedulerConfig {
    /// Reads `scheduler.watcher_interval_ms` and `scheduler.stop_timeout_ms`,
    /// keeping defaults for anything unset.
    pub fn from_props(props: &Props) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let watcher_ms = props.value_as_u64(
            keys::SCHEDULER_WATCHER_INTERVAL_MS,
            defaults.watcher_interval.as_millis() as u64,
        )?;
        let stop_ms = props.value_as_u64(
            keys::SCHEDULER_STOP_TIMEOUT_MS,
            defaults.stop_timeout.as_millis() as u64,
        )?;
        Ok(Self {
            watcher_interval: Duration::from_millis(watcher_ms.max(1)),
            stop_timeout: Duration::from_millis(stop_ms),
            ..defaults
        })
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SchedulerConfig {
    /// - `watcher_interval = 500ms`
    /// - `stop_timeout = 60s`
    /// - `force_wait = 5s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            watcher_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(60),
            force_wait: Duration::from_secs(5),
            bus_capacity: 1024,
        }
    }
}
