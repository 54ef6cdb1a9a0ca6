use std::sync::Arc;

use super::{
    config::SchedulerConfig,
    scheduler::{Collaborators, Scheduler},
};
use crate::{
    events::Bus,
    process::{CommandFactory, ProcessLauncher},
    settings::AppSettings,
    state::AppState,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Scheduler`].
///
/// The four collaborators are mandatory; configuration and subscribers are optional.
pub struct SchedulerBuilder {
    parts: Collaborators,
    cfg: SchedulerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SchedulerBuilder {
    /// Creates a builder with the default [`SchedulerConfig`] and no subscriber.
    pub fn new(
        settings: Arc<dyn AppSettings>,
        state: Arc<dyn AppState>,
        commands: Arc<dyn CommandFactory>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            parts: Collaborators {
                settings,
                state,
                commands,
                launcher,
            },
            cfg: SchedulerConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the runtime configuration.
    pub fn with_config(mut self, cfg: SchedulerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events (process lifecycle, restarts, stop cause)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the scheduler in the `Idle` state.
    ///
    /// Must be called from within a Tokio runtime: the event listener and the
    /// subscriber workers are spawned here.
    pub fn build(self) -> Scheduler {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        Scheduler::new(self.parts, self.cfg, subs, bus)
    }
}
