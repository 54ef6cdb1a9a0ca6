//! Error types used by the appvisor runtime.
//!
//! This module defines four error enums:
//!
//! - [`ConfigError`]: invalid or inconsistent configuration (fatal before start or at restart).
//! - [`LaunchError`]: a worker process could not be built or spawned.
//! - [`StateError`]: the application state (local or cluster) could not be set up.
//! - [`SchedulerError`]: misuse of the scheduler lifecycle API.
//!
//! Every type provides `as_label` for logs, mirroring the stable snake_case
//! labels used across the runtime events.

use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

use crate::process::ProcessRole;

/// # Configuration errors.
///
/// Messages always name the offending property and quote its value verbatim.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Cluster port outside `[1-65535]` (or not a number at all).
    #[error("cluster port has been set to {value} which is outside the range [1-65535] (property '{key}')")]
    InvalidPort {
        /// Property key.
        key: &'static str,
        /// Raw value as configured.
        value: String,
    },

    /// A configured bind interface does not belong to this machine.
    #[error("interface {value} is not available on this machine (property '{key}')")]
    InterfaceUnavailable {
        /// Property key.
        key: &'static str,
        /// Raw interface value as configured.
        value: String,
    },

    /// Cluster mode enabled without a cluster name.
    #[error("cluster has been enabled but '{key}' has not been defined")]
    MissingClusterName {
        /// Property key of the cluster name.
        key: &'static str,
    },

    /// Generic malformed value.
    #[error("invalid value '{value}' for property '{key}': {reason}")]
    InvalidValue {
        /// Property key.
        key: String,
        /// Raw value as configured.
        value: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Every managed role has been disabled.
    #[error("at least one process is required; search, web and compute have all been disabled")]
    NoProcessEnabled,

    /// A property that must stay constant across restarts was changed.
    #[error("change of property '{key}' is not supported on restart ('{old}' => '{new}')")]
    ImmutableChanged {
        /// Property key.
        key: &'static str,
        /// Value before reload (empty when unset).
        old: String,
        /// Value after reload (empty when unset).
        new: String,
    },

    /// Cluster-only component requested while cluster mode is disabled.
    #[error("cluster is not enabled on this instance")]
    ClusterDisabled,

    /// Configuration file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid TOML.
    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use appvisor::ConfigError;
    ///
    /// let err = ConfigError::InvalidPort { key: "cluster.port", value: "0".into() };
    /// assert_eq!(err.as_label(), "config_invalid_port");
    /// assert!(err.to_string().contains("set to 0 "));
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidPort { .. } => "config_invalid_port",
            ConfigError::InterfaceUnavailable { .. } => "config_interface_unavailable",
            ConfigError::MissingClusterName { .. } => "config_missing_cluster_name",
            ConfigError::InvalidValue { .. } => "config_invalid_value",
            ConfigError::NoProcessEnabled => "config_no_process_enabled",
            ConfigError::ImmutableChanged { .. } => "config_immutable_changed",
            ConfigError::ClusterDisabled => "config_cluster_disabled",
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse { .. } => "config_parse",
        }
    }
}

/// # Errors raised while building or spawning a worker.
///
/// For the scheduler a launch failure is equivalent to the death of the process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// No usable launch command could be built for the role.
    #[error("cannot build launch command for {role}: {reason}")]
    Command {
        /// Role being launched.
        role: ProcessRole,
        /// Human-readable reason.
        reason: String,
    },

    /// The OS refused to spawn the process.
    #[error("cannot spawn {role} process: {source}")]
    Spawn {
        /// Role being launched.
        role: ProcessRole,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The per-process status directory could not be prepared.
    #[error("cannot prepare status directory {path}: {source}")]
    StatusDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Launch refused for another reason (used by custom launchers).
    #[error("cannot start {role}: {reason}")]
    Refused {
        /// Role being launched.
        role: ProcessRole,
        /// Human-readable reason.
        reason: String,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Command { .. } => "launch_command",
            LaunchError::Spawn { .. } => "launch_spawn",
            LaunchError::StatusDir { .. } => "launch_status_dir",
            LaunchError::Refused { .. } => "launch_refused",
        }
    }
}

/// # Errors raised while constructing the application state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StateError {
    /// Configuration rejected (including "cluster is not enabled").
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No UDP port could be bound for cluster gossip.
    #[error("cannot bind cluster socket on {addr}: {source}")]
    Bind {
        /// Last address tried.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl StateError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StateError::Config(e) => e.as_label(),
            StateError::Bind { .. } => "state_bind",
        }
    }
}

/// # Errors produced by the scheduler lifecycle API.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// `schedule()` may only move the scheduler out of `Idle` once.
    #[error("scheduler has already been scheduled (state: {state})")]
    AlreadyScheduled {
        /// State observed when the call was made.
        state: crate::core::SchedulerState,
    },

    /// Enabled roles could not be computed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::AlreadyScheduled { .. } => "scheduler_already_scheduled",
            SchedulerError::Config(e) => e.as_label(),
        }
    }
}
