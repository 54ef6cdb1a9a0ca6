//! In-memory doubles of the scheduler collaborators.

#![allow(dead_code)]

use std::{
    collections::BTreeSet,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;

use appvisor::{
    AppSettings, AppState, CommandFactory, ConfigError, Event, EventKind, LaunchError, LaunchSpec,
    LocalAppState, ProcessLauncher, ProcessMonitor, ProcessRole, Props, Scheduler, SchedulerBuilder,
    SchedulerConfig, Subscribe, settings::keys,
};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Roles in the order they went from alive to dead.
pub type Stops = Arc<Mutex<Vec<ProcessRole>>>;

/// A fake worker. Stopping it kills it at once, unless it is stubborn: then only a
/// forced stop does.
pub struct TestProcess {
    role: ProcessRole,
    alive: AtomicBool,
    operational: AtomicBool,
    restart: AtomicBool,
    stubborn: bool,
    graceful_at: Mutex<Option<Instant>>,
    forced_at: Mutex<Option<Instant>>,
    stops: Stops,
}

impl TestProcess {
    fn new(role: ProcessRole, operational: bool, stubborn: bool, stops: Stops) -> Self {
        Self {
            role,
            alive: AtomicBool::new(true),
            operational: AtomicBool::new(operational),
            restart: AtomicBool::new(false),
            stubborn,
            graceful_at: Mutex::new(None),
            forced_at: Mutex::new(None),
            stops,
        }
    }

    /// When the graceful stop was asked for.
    pub fn graceful_at(&self) -> Option<Instant> {
        *self.graceful_at.lock()
    }

    /// When the process was killed.
    pub fn forced_at(&self) -> Option<Instant> {
        *self.forced_at.lock()
    }

    pub fn set_operational(&self) {
        self.operational.store(true, Ordering::SeqCst);
    }

    pub fn ask_for_restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
    }

    /// Simulates a crash.
    pub fn die(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.stops.lock().push(self.role);
        }
    }
}

#[async_trait]
impl ProcessMonitor for TestProcess {
    fn role(&self) -> ProcessRole {
        self.role
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn is_operational(&self) -> bool {
        self.operational.load(Ordering::SeqCst)
    }

    fn asked_for_restart(&self) -> bool {
        self.restart.load(Ordering::SeqCst)
    }

    fn acknowledge_restart(&self) {
        self.restart.store(false, Ordering::SeqCst);
    }

    fn request_graceful_stop(&self) {
        *self.graceful_at.lock() = Some(Instant::now());
        if !self.stubborn {
            self.die();
        }
    }

    fn force_stop(&self) {
        *self.forced_at.lock() = Some(Instant::now());
        self.die();
    }

    async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_alive() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        true
    }
}

/// Builds launch specs carrying only the role and the leader flag.
pub struct TestCommands;

impl CommandFactory for TestCommands {
    fn create(&self, role: ProcessRole, leader: bool) -> Result<LaunchSpec, LaunchError> {
        Ok(LaunchSpec::new(role, format!("/bin/{}", role.key())).with_leader(leader))
    }
}

/// Hands out [`TestProcess`]es and remembers every launch.
pub struct TestLauncher {
    auto_operational: AtomicBool,
    failing: Mutex<BTreeSet<ProcessRole>>,
    stubborn: Mutex<BTreeSet<ProcessRole>>,
    launched: Mutex<Vec<LaunchSpec>>,
    processes: Mutex<Vec<Arc<TestProcess>>>,
    pub stops: Stops,
}

impl TestLauncher {
    pub fn new(auto_operational: bool) -> Arc<Self> {
        Arc::new(Self {
            auto_operational: AtomicBool::new(auto_operational),
            failing: Mutex::new(BTreeSet::new()),
            stubborn: Mutex::new(BTreeSet::new()),
            launched: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
            stops: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn fail(&self, role: ProcessRole) {
        self.failing.lock().insert(role);
    }

    /// Later launches of `role` ignore graceful stop requests.
    pub fn stubborn(&self, role: ProcessRole) {
        self.stubborn.lock().insert(role);
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.lock().clone()
    }

    pub fn launched_roles(&self) -> Vec<ProcessRole> {
        self.launched.lock().iter().map(|s| s.role).collect()
    }

    pub fn stops(&self) -> Vec<ProcessRole> {
        self.stops.lock().clone()
    }

    /// Latest process launched for `role`.
    pub fn process(&self, role: ProcessRole) -> Arc<TestProcess> {
        self.processes
            .lock()
            .iter()
            .rev()
            .find(|p| p.role == role)
            .cloned()
            .unwrap_or_else(|| panic!("{role} was never launched"))
    }
}

#[async_trait]
impl ProcessLauncher for TestLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessMonitor>, LaunchError> {
        let role = spec.role;
        self.launched.lock().push(spec);
        if self.failing.lock().contains(&role) {
            return Err(LaunchError::Refused {
                role,
                reason: "refused by test".into(),
            });
        }
        let process = Arc::new(TestProcess::new(
            role,
            self.auto_operational.load(Ordering::SeqCst),
            self.stubborn.lock().contains(&role),
            Arc::clone(&self.stops),
        ));
        self.processes.lock().push(Arc::clone(&process));
        Ok(process)
    }
}

/// Fixed properties with a scriptable reload.
pub struct TestSettings {
    props: Mutex<Props>,
    reloads: AtomicUsize,
    fail_reload: AtomicBool,
}

impl TestSettings {
    pub fn new(props: Props) -> Arc<Self> {
        Arc::new(Self {
            props: Mutex::new(props),
            reloads: AtomicUsize::new(0),
            fail_reload: AtomicBool::new(false),
        })
    }

    pub fn standalone() -> Arc<Self> {
        Self::new(Props::new())
    }

    /// Cluster mode with the given roles disabled.
    pub fn cluster_without(disabled: &[ProcessRole]) -> Arc<Self> {
        let mut props = Props::new();
        props.set(keys::CLUSTER_ENABLED, "true");
        for role in disabled {
            if let Some(key) = keys::cluster_disabled(*role) {
                props.set(key, "true");
            }
        }
        Self::new(props)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn fail_next_reload(&self) {
        self.fail_reload.store(true, Ordering::SeqCst);
    }
}

impl AppSettings for TestSettings {
    fn props(&self) -> Props {
        self.props.lock().clone()
    }

    fn reload(&self) -> Result<(), ConfigError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(ConfigError::ImmutableChanged {
                key: keys::PATH_DATA,
                old: "/data/a".into(),
                new: "/data/b".into(),
            });
        }
        Ok(())
    }
}

/// Records every event.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn roles_of(&self, kind: EventKind) -> Vec<ProcessRole> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.role)
            .collect()
    }

    /// Kinds of the events about `role`, in order.
    pub fn kinds_for(&self, role: ProcessRole) -> Vec<EventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.role == Some(role))
            .map(|e| e.kind)
            .collect()
    }

    pub fn reasons_of(&self, kind: EventKind) -> Vec<Option<String>> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.reason.as_deref().map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

/// A scheduler wired to doubles, polling every 5ms.
pub struct Harness {
    pub scheduler: Scheduler,
    pub settings: Arc<TestSettings>,
    pub state: Arc<LocalAppState>,
    pub launcher: Arc<TestLauncher>,
    pub recorder: Arc<Recorder>,
}

impl Harness {
    pub fn new(settings: Arc<TestSettings>, launcher: Arc<TestLauncher>) -> Self {
        Self::with_state(settings, launcher, Arc::new(LocalAppState::new()))
    }

    pub fn with_state(
        settings: Arc<TestSettings>,
        launcher: Arc<TestLauncher>,
        state: Arc<LocalAppState>,
    ) -> Self {
        let recorder = Arc::new(Recorder::default());
        let cfg = SchedulerConfig {
            watcher_interval: Duration::from_millis(5),
            stop_timeout: Duration::from_millis(200),
            force_wait: Duration::from_millis(50),
            ..SchedulerConfig::default()
        };
        let scheduler = SchedulerBuilder::new(
            Arc::clone(&settings) as Arc<dyn AppSettings>,
            Arc::clone(&state) as Arc<dyn AppState>,
            Arc::new(TestCommands),
            Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
        )
        .with_config(cfg)
        .with_subscriber(Arc::clone(&recorder) as Arc<dyn Subscribe>)
        .build();
        Self {
            scheduler,
            settings,
            state,
            launcher,
            recorder,
        }
    }
}

/// Polls `cond` until it holds, panicking after five seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Fails if `fut` does not finish within five seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation did not finish in time")
}
