//! Runtime core: orchestration and lifecycle.
//!
//! Public API: [`Scheduler`] (built with [`SchedulerBuilder`]), its configuration
//! and lifecycle types, and the [`StopWatcher`].
//!
//! Internal modules:
//! - [`scheduler`]: the state machine, its control loop and the stop sequence;
//! - [`watcher`]: polls one process and reports deaths, readiness and restart requests;
//! - [`shutdown`]: cross-platform OS signal handling;
//! - [`stop_watcher`]: OS signal / stop file → `terminate()`.

mod builder;
mod config;
mod scheduler;
mod shutdown;
mod stop_watcher;
mod watcher;

pub use builder::SchedulerBuilder;
pub use config::SchedulerConfig;
pub use scheduler::{Scheduler, SchedulerState, StopCause};
pub use stop_watcher::{STOP_FILE_NAME, StopWatcher, request_stop, stop_file};
