//! # Scheduler: the process orchestration state machine.
//!
//! The [`Scheduler`] starts the enabled roles in dependency order, watches them, and
//! reacts to deaths and restart requests. Every reaction runs under one lock (the
//! `Core`), so starting the next role, handling a death, handling a restart and
//! terminating never interleave.
//!
//! ## Lifecycle
//! ```text
//! Idle ──schedule()──► Running ──death / launch failure──► Stopping ──► Stopped(cause)
//!  │                     │  ▲
//!  │                     │  └── restart: stop all, reload, reset state, start all
//!  │                     │        (reload failure ──► Stopping ──► Stopped(RestartAborted))
//!  │                     └──terminate()──► Stopping ──► Stopped(Terminated)
//!  └──terminate()──► Stopped(Terminated)
//! ```
//!
//! ## Wiring
//! ```text
//!   ProcessWatcher ×N ──Died / RestartRequested──┐
//!   AppState listener ──Operational(role)─────────┼──► control loop ──lock──► Core
//!   terminate() ──cancel token, lock──────────────┘
//!
//!   control loop / watchers ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - A role starts once every enabled predecessor is operational (cluster-wide in
//!   cluster mode). The web role first tries to take the web leader lock.
//! - Any death or launch failure stops every running process and ends in `Stopped`.
//! - Processes are stopped in reverse start order: graceful stop, bounded wait, forced
//!   stop, bounded wait.
//! - A restart request stops everything, reloads the settings and starts again; a
//!   reload failure goes through `Stopping` to `Stopped(RestartAborted)`. The public
//!   state stays `Running` for the whole restart.
//! - Every way to `Stopped` from `Running` passes `Stopping` and publishes
//!   `SchedulerStopping`.
//! - `terminate()` is idempotent and `Stopped` is absorbing.
//! - Dropping the last handle closes the event listener, even before `Stopped`.

use std::{collections::BTreeSet, fmt, sync::Arc, sync::OnceLock};

use tokio::{
    sync::{Mutex, broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    config::SchedulerConfig,
    watcher::{ProcessWatcher, Signal},
};
use crate::{
    error::SchedulerError,
    events::{Bus, Event, EventKind},
    process::{CommandFactory, ProcessLauncher, ProcessMonitor, ProcessRole},
    settings::AppSettings,
    state::AppState,
    subscribers::SubscriberSet,
};

/// Public lifecycle state of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Built, `schedule()` not called yet.
    Idle,
    /// Processes are being started or are running.
    Running,
    /// Every process is being stopped.
    Stopping,
    /// Terminal; nothing runs and nothing will.
    Stopped,
}

impl SchedulerState {
    /// True for [`SchedulerState::Stopped`].
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SchedulerState::Stopped)
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a scheduler reached [`SchedulerState::Stopped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopCause {
    /// `terminate()` was called.
    Terminated,
    /// A managed process exited on its own.
    ProcessDied(ProcessRole),
    /// A managed process could not be launched.
    LaunchFailed(ProcessRole),
    /// Settings could not be reloaded during a restart.
    RestartAborted,
}

impl StopCause {
    /// True when the stop was asked for (as opposed to a failure).
    #[inline]
    pub fn is_requested(self) -> bool {
        matches!(self, StopCause::Terminated)
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::Terminated => f.write_str("terminated"),
            StopCause::ProcessDied(role) => write!(f, "process {role} died"),
            StopCause::LaunchFailed(role) => write!(f, "process {role} failed to launch"),
            StopCause::RestartAborted => f.write_str("restart aborted, configuration could not be reloaded"),
        }
    }
}

struct Running {
    role: ProcessRole,
    monitor: Arc<dyn ProcessMonitor>,
    watcher: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Core {
    enabled: Vec<ProcessRole>,
    /// Launched processes, in start order.
    running: Vec<Running>,
    /// Roles launched (or attempted) in the current generation.
    started: BTreeSet<ProcessRole>,
    generation: u64,
}

pub(crate) struct Collaborators {
    pub settings: Arc<dyn AppSettings>,
    pub state: Arc<dyn AppState>,
    pub commands: Arc<dyn CommandFactory>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

struct Inner {
    settings: Arc<dyn AppSettings>,
    state: Arc<dyn AppState>,
    commands: Arc<dyn CommandFactory>,
    launcher: Arc<dyn ProcessLauncher>,
    cfg: SchedulerConfig,
    bus: Bus,

    core: Mutex<Core>,
    lifecycle: watch::Sender<SchedulerState>,
    cause: OnceLock<StopCause>,
    /// Stopping intent; watchers run on child tokens.
    token: CancellationToken,
    /// Cancelled once every event has been handed to the subscribers.
    drained: CancellationToken,
    /// Cancelled on drop; ends the event listener.
    closed: CancellationToken,

    signals: mpsc::UnboundedSender<Signal>,
    signals_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
}

/// Orchestrates the managed processes of one node.
///
/// Cheap to clone; every clone drives the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub(crate) fn new(parts: Collaborators, cfg: SchedulerConfig, subs: SubscriberSet, bus: Bus) -> Self {
        let (lifecycle, _) = watch::channel(SchedulerState::Idle);
        let (signals, signals_rx) = mpsc::unbounded_channel();
        let drained = CancellationToken::new();
        let closed = CancellationToken::new();
        spawn_event_listener(&bus, subs, lifecycle.subscribe(), drained.clone(), closed.clone());

        Self {
            inner: Arc::new(Inner {
                settings: parts.settings,
                state: parts.state,
                commands: parts.commands,
                launcher: parts.launcher,
                cfg,
                bus,
                core: Mutex::new(Core::default()),
                lifecycle,
                cause: OnceLock::new(),
                token: CancellationToken::new(),
                drained,
                closed,
                signals,
                signals_rx: parking_lot::Mutex::new(Some(signals_rx)),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.inner.lifecycle.borrow()
    }

    /// Stop cause, once stopped.
    pub fn stop_cause(&self) -> Option<StopCause> {
        self.inner.cause.get().copied()
    }

    /// Event bus the scheduler publishes on.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Starts the enabled roles in dependency order.
    ///
    /// Returns once the roles without pending predecessors are launched; the others
    /// start as their predecessors become operational.
    ///
    /// # Errors
    /// - [`SchedulerError::AlreadyScheduled`] unless the scheduler is `Idle`;
    /// - [`SchedulerError::Config`] if the enabled roles cannot be computed.
    pub async fn schedule(&self) -> Result<(), SchedulerError> {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;
        let current = *inner.lifecycle.borrow();
        if current != SchedulerState::Idle {
            return Err(SchedulerError::AlreadyScheduled { state: current });
        }
        let rx = inner.signals_rx.lock().take();
        let Some(rx) = rx else {
            return Err(SchedulerError::AlreadyScheduled { state: current });
        };

        core.enabled = ProcessRole::ordered(&inner.settings.enabled_roles()?);
        core.generation = 1;
        inner.lifecycle.send_replace(SchedulerState::Running);
        inner
            .bus
            .publish(Event::new(EventKind::Scheduled).with_generation(core.generation));

        let tx = inner.signals.clone();
        inner.state.add_listener(Box::new(move |role| {
            let _ = tx.send(Signal::Operational(role));
        }));
        tokio::spawn(Arc::clone(inner).control_loop(rx));

        inner.try_start_all(&mut core).await;
        Ok(())
    }

    /// Stops every running process in reverse start order and ends in `Stopped`.
    ///
    /// Only the first call does anything; later calls (and calls after the scheduler
    /// stopped on its own) return at once.
    pub async fn terminate(&self) {
        self.shutdown(None).await;
    }

    /// Like [`terminate`](Self::terminate), naming the requester in the
    /// `ShutdownRequested` event (an OS signal, the stop file, an operator).
    pub async fn terminate_with_reason(&self, reason: impl Into<Arc<str>>) {
        self.shutdown(Some(reason.into())).await;
    }

    async fn shutdown(&self, reason: Option<Arc<str>>) {
        let inner = &self.inner;
        inner.token.cancel();
        let mut core = inner.core.lock().await;
        let current = *inner.lifecycle.borrow();
        match current {
            SchedulerState::Stopped => return,
            SchedulerState::Idle => {}
            SchedulerState::Running | SchedulerState::Stopping => {
                let mut requested = Event::new(EventKind::ShutdownRequested);
                if let Some(reason) = reason {
                    requested = requested.with_reason(reason);
                }
                inner.bus.publish(requested);
                inner.begin_stopping(StopCause::Terminated);
                inner.stop_all(&mut core).await;
            }
        }
        inner.finish(StopCause::Terminated);
    }

    /// Waits, without timeout, until the scheduler is `Stopped` and its events were
    /// delivered to the subscribers.
    ///
    /// Any number of tasks may wait concurrently; returns at once when already stopped.
    pub async fn await_termination(&self) -> StopCause {
        let inner = &self.inner;
        let mut rx = inner.lifecycle.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        inner.drained.cancelled().await;
        inner.cause.get().copied().unwrap_or(StopCause::Terminated)
    }
}

impl Inner {
    async fn control_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Signal>) {
        loop {
            let signal = tokio::select! {
                _ = self.token.cancelled() => break,
                s = rx.recv() => match s {
                    Some(s) => s,
                    None => break,
                },
            };
            self.handle(signal).await;
        }
    }

    async fn handle(&self, signal: Signal) {
        let mut core = self.core.lock().await;
        if *self.lifecycle.borrow() != SchedulerState::Running || self.token.is_cancelled() {
            return;
        }
        match signal {
            Signal::Operational(role) => {
                debug!(%role, "operational role observed");
                self.try_start_all(&mut core).await;
            }
            Signal::Died { role, generation } if generation == core.generation => {
                self.contain(&mut core, StopCause::ProcessDied(role)).await;
            }
            Signal::RestartRequested { role, generation } if generation == core.generation => {
                self.restart(&mut core, role).await;
            }
            stale => debug!(?stale, generation = core.generation, "ignoring signal from a previous start cycle"),
        }
    }

    /// Launches, in order, every role whose predecessors are ready.
    async fn try_start_all(&self, core: &mut Core) {
        for role in core.enabled.clone() {
            if self.token.is_cancelled() {
                return;
            }
            if core.started.contains(&role) {
                continue;
            }
            let ready = role
                .predecessors()
                .iter()
                .all(|p| !core.enabled.contains(p) || self.state.is_operational(*p));
            if !ready {
                return;
            }
            if let Err(cause) = self.start(core, role).await {
                self.contain(core, cause).await;
                return;
            }
        }
    }

    async fn start(&self, core: &mut Core, role: ProcessRole) -> Result<(), StopCause> {
        let generation = core.generation;
        core.started.insert(role);

        let mut starting = Event::new(EventKind::ProcessStarting)
            .with_role(role)
            .with_generation(generation);
        let leader = if role == ProcessRole::Web {
            let leader = self.state.try_acquire_web_leader_lock().await;
            starting = starting.with_leader(leader);
            leader
        } else {
            false
        };
        self.bus.publish(starting);

        let launched = match self.commands.create(role, leader) {
            Ok(spec) => self.launcher.launch(spec).await,
            Err(e) => Err(e),
        };
        let monitor = match launched {
            Ok(monitor) => monitor,
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::ProcessLaunchFailed)
                        .with_role(role)
                        .with_generation(generation)
                        .with_reason(e.to_string()),
                );
                return Err(StopCause::LaunchFailed(role));
            }
        };

        let watcher = self.token.child_token();
        let handle = tokio::spawn(
            ProcessWatcher::new(
                Arc::clone(&monitor),
                Arc::clone(&self.state),
                self.bus.clone(),
                self.signals.clone(),
                self.cfg.watcher_interval,
                generation,
            )
            .run(watcher.clone()),
        );
        core.running.push(Running {
            role,
            monitor,
            watcher,
            handle,
        });
        self.bus.publish(
            Event::new(EventKind::ProcessStarted)
                .with_role(role)
                .with_generation(generation),
        );
        Ok(())
    }

    /// One-for-all containment.
    async fn contain(&self, core: &mut Core, cause: StopCause) {
        self.begin_stopping(cause);
        self.stop_all(core).await;
        self.finish(cause);
    }

    async fn restart(&self, core: &mut Core, role: ProcessRole) {
        self.bus.publish(
            Event::new(EventKind::RestartRequested)
                .with_role(role)
                .with_generation(core.generation),
        );
        self.stop_all(core).await;
        if self.token.is_cancelled() {
            self.begin_stopping(StopCause::Terminated);
            self.finish(StopCause::Terminated);
            return;
        }

        let enabled = self
            .settings
            .reload()
            .and_then(|()| self.settings.enabled_roles());
        match enabled {
            Ok(enabled) => {
                self.bus.publish(Event::new(EventKind::ConfigReloaded));
                core.enabled = ProcessRole::ordered(&enabled);
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::ConfigReloadFailed).with_reason(e.to_string()),
                );
                // processes are already down; nothing left to stop
                self.begin_stopping(StopCause::RestartAborted);
                self.finish(StopCause::RestartAborted);
                return;
            }
        }

        self.state.reset().await;
        core.generation += 1;
        self.try_start_all(core).await;
    }

    /// Stops every launched process, latest started first.
    async fn stop_all(&self, core: &mut Core) {
        for r in &core.running {
            r.watcher.cancel();
        }
        while let Some(r) = core.running.pop() {
            self.stop_process(r.role, r.monitor.as_ref()).await;
            let _ = r.handle.await;
        }
        core.started.clear();
    }

    async fn stop_process(&self, role: ProcessRole, monitor: &dyn ProcessMonitor) {
        if monitor.is_alive() {
            self.bus.publish(
                Event::new(EventKind::ProcessStopping)
                    .with_role(role)
                    .with_timeout(self.cfg.stop_timeout),
            );
            monitor.request_graceful_stop();
            if !monitor.wait_for_exit(self.cfg.stop_timeout).await {
                self.bus
                    .publish(Event::new(EventKind::ProcessStopForced).with_role(role));
                monitor.force_stop();
                if !monitor.wait_for_exit(self.cfg.force_wait).await {
                    warn!(%role, "process still alive after forced stop");
                }
            }
        }
        self.bus
            .publish(Event::new(EventKind::ProcessStopped).with_role(role));
    }

    fn begin_stopping(&self, cause: StopCause) {
        if self.lifecycle.send_replace(SchedulerState::Stopping) != SchedulerState::Stopping {
            self.bus.publish(
                Event::new(EventKind::SchedulerStopping).with_reason(cause.to_string()),
            );
        }
    }

    fn finish(&self, cause: StopCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
        self.lifecycle.send_replace(SchedulerState::Stopped);
        self.bus.publish(
            Event::new(EventKind::SchedulerStopped).with_reason(cause.to_string()),
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Forwards bus events to the subscribers until the scheduler stopped or was dropped.
fn spawn_event_listener(
    bus: &Bus,
    subs: SubscriberSet,
    lifecycle: watch::Receiver<SchedulerState>,
    drained: CancellationToken,
    closed: CancellationToken,
) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                biased;
                r = rx.recv() => r,
                _ = closed.cancelled() => {
                    debug!("scheduler dropped, closing event listener");
                    break;
                }
            };
            match received {
                Ok(ev) => {
                    let last = ev.kind == EventKind::SchedulerStopped;
                    subs.emit(&ev);
                    if last {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged behind");
                    if lifecycle.borrow().is_terminal() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        subs.shutdown().await;
        drained.cancel();
    });
}
