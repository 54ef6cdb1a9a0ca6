//! # appvisor
//!
//! **Appvisor** supervises a fixed set of cooperating worker processes
//! (search, web and compute) on one node, optionally as part of a cluster.
//!
//! It starts the workers in dependency order, watches them, stops everything
//! as soon as one of them dies, performs coordinated restarts when a worker
//! asks for one, and elects a single web leader across the cluster.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   AppSettings        AppState             CommandFactory   ProcessLauncher
//!  (props, reload) (local | cluster view)   (role → spec)    (spec → monitor)
//!        │                 │                      │                │
//!        ▼                 ▼                      ▼                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler (state machine + control loop)                         │
//! │  - starts SEARCH ─► WEB ─► COMPUTE as predecessors go operational │
//! │  - one ProcessWatcher per running worker                          │
//! │  - stop sequence: reverse start order, graceful then forced       │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//!  │ Watcher      │   │ Watcher      │   │ Watcher      │      │
//!  │ (search)     │   │ (web)        │   │ (compute)    │      │
//!  └┬─────────────┘   └┬─────────────┘   └┬─────────────┘      │
//!   │ died / operational / restart requested                   │
//!   ▼                  ▼                  ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! │               (capacity: SchedulerConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                            SubscriberSet
//!                          (per-sub queues)
//!                       ┌─────────┼─────────┐
//!                       ▼         ▼         ▼
//!                   LogWriter   sub2      subN
//! ```
//!
//! ### Lifecycle
//! ```text
//! Idle ──schedule()──► Running ──terminate() / death / restart failure──► Stopping ──► Stopped
//!
//! Running:
//!   ├─► SEARCH launched at once
//!   ├─► SEARCH operational ──► WEB launched (after trying the web leader lock)
//!   ├─► WEB operational    ──► COMPUTE launched
//!   ├─► any death / launch failure ──► stop all, Stopped
//!   └─► restart requested ──► stop all, reload settings, reset state, start again
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                            |
//! |-------------------|-----------------------------------------------------------------|-----------------------------------------------|
//! | **Scheduling**    | Ordered start, one-for-all stop, coordinated restart.           | [`Scheduler`], [`SchedulerBuilder`]           |
//! | **Processes**     | Roles, launch specs, OS process monitors.                       | [`ProcessRole`], [`ProcessMonitor`], [`ChildLauncher`] |
//! | **State**         | Operational flags, listeners and the web leader lock.           | [`AppState`], [`LocalAppState`], [`ClusterAppState`] |
//! | **Configuration** | TOML + overrides, restart-safe reload, cluster validation.      | [`AppSettings`], [`FileSettings`], [`ClusterConfig`] |
//! | **Subscriber API**| Hook into runtime events (logging, alerting, custom sinks).     | [`Subscribe`], [`Event`]                      |
//! | **Stop triggers** | OS signals and a stop file in the temp directory.               | [`StopWatcher`], [`request_stop`]             |
//! | **Errors**        | Typed errors with stable labels.                                | [`ConfigError`], [`LaunchError`], [`SchedulerError`] |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber (enabled by default).
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use appvisor::{
//!     AppSettings, ChildLauncher, ClusterConfig, FileSettings, PropsCommandFactory,
//!     SchedulerBuilder, SettingsLoader, StopWatcher, build_app_state,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings: Arc<dyn AppSettings> =
//!         Arc::new(FileSettings::load(SettingsLoader::new("/opt/app").with_config_file("/opt/app/conf/app.toml"))?);
//!     let state = build_app_state(&ClusterConfig::from_props(&settings.props())?).await?;
//!
//!     let scheduler = SchedulerBuilder::new(
//!         Arc::clone(&settings),
//!         Arc::clone(&state),
//!         Arc::new(PropsCommandFactory::new(Arc::clone(&settings))),
//!         Arc::new(ChildLauncher::new("/opt/app/temp/status")),
//!     )
//!     .build();
//!
//!     scheduler.schedule().await?;
//!     StopWatcher::new(scheduler.clone()).spawn();
//!
//!     let cause = scheduler.await_termination().await;
//!     state.close().await;
//!     println!("stopped: {cause}");
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod process;
pub mod settings;
mod state;
mod subscribers;

// ---- Public re-exports ----

pub use self::core::{
    STOP_FILE_NAME, Scheduler, SchedulerBuilder, SchedulerConfig, SchedulerState, StopCause,
    StopWatcher, request_stop, stop_file,
};
pub use error::{ConfigError, LaunchError, SchedulerError, StateError};
pub use events::{Bus, Event, EventKind};
pub use process::{
    ChildLauncher, ChildMonitor, CommandFactory, ENV_PROCESS, ENV_STATUS_DIR, ENV_WEB_LEADER,
    LaunchSpec, ProcessLauncher, ProcessMonitor, ProcessRole, PropsCommandFactory,
};
pub use settings::{AppSettings, ClusterConfig, FileSettings, Props, SettingsLoader};
pub use state::{
    AppState, ClusterAppState, ClusterProcessKey, ClusterTimings, Listener, LocalAppState, NodeId,
    build_app_state,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
