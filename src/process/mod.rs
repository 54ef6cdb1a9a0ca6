//! Managed processes: roles, monitors and launchers.
//!
//! - [`ProcessRole`]: the fixed set of roles and their dependency order;
//! - [`ProcessMonitor`]: polled handle to one running worker;
//! - [`CommandFactory`] / [`ProcessLauncher`]: turn a role into a running worker;
//! - [`ChildLauncher`]: launcher spawning real OS processes.

mod child;
mod launch;
mod monitor;
mod role;

pub use child::{ChildLauncher, ChildMonitor, ENV_PROCESS, ENV_STATUS_DIR};
pub use launch::{CommandFactory, ENV_WEB_LEADER, LaunchSpec, ProcessLauncher, PropsCommandFactory};
pub use monitor::ProcessMonitor;
pub use role::ProcessRole;
