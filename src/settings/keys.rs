//! Property keys and their defaults.

use crate::process::ProcessRole;

pub const PATH_HOME: &str = "path.home";
pub const PATH_DATA: &str = "path.data";
pub const PATH_TEMP: &str = "path.temp";
pub const PATH_LOGS: &str = "path.logs";

pub const CLUSTER_ENABLED: &str = "cluster.enabled";
pub const CLUSTER_NAME: &str = "cluster.name";
pub const CLUSTER_PORT: &str = "cluster.port";
pub const CLUSTER_PORT_AUTOINCREMENT: &str = "cluster.port_autoincrement";
pub const CLUSTER_INTERFACES: &str = "cluster.interfaces";
pub const CLUSTER_MEMBERS: &str = "cluster.members";
pub const CLUSTER_SEARCH_DISABLED: &str = "cluster.search.disabled";
pub const CLUSTER_WEB_DISABLED: &str = "cluster.web.disabled";
pub const CLUSTER_COMPUTE_DISABLED: &str = "cluster.compute.disabled";

pub const SCHEDULER_WATCHER_INTERVAL_MS: &str = "scheduler.watcher_interval_ms";
pub const SCHEDULER_STOP_TIMEOUT_MS: &str = "scheduler.stop_timeout_ms";

pub const DEFAULT_CLUSTER_PORT: u16 = 9003;

/// Keys whose value may not change when configuration is reloaded for a restart.
pub const IMMUTABLE_ON_RESTART: [&str; 5] = [PATH_HOME, PATH_DATA, PATH_TEMP, PATH_LOGS, CLUSTER_ENABLED];

/// `process.<role>.command`
pub fn process_command(role: ProcessRole) -> String {
    format!("process.{}.command", role.key())
}

/// `process.<role>.args`
pub fn process_args(role: ProcessRole) -> String {
    format!("process.{}.args", role.key())
}

/// `cluster.<role>.disabled`
pub fn cluster_disabled(role: ProcessRole) -> Option<&'static str> {
    match role {
        ProcessRole::Search => Some(CLUSTER_SEARCH_DISABLED),
        ProcessRole::Web => Some(CLUSTER_WEB_DISABLED),
        ProcessRole::Compute => Some(CLUSTER_COMPUTE_DISABLED),
        ProcessRole::App => None,
    }
}
