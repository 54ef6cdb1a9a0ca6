//! # Launch specifications, command builders and launchers.
//!
//! ```text
//! Scheduler ──► CommandFactory::create(role, leader) ──► LaunchSpec
//!           ──► ProcessLauncher::launch(LaunchSpec)  ──► Arc<dyn ProcessMonitor>
//! ```
//!
//! The scheduler treats both as opaque collaborators: a failing `create` or `launch`
//! is handled exactly like the death of the process.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;

use super::{ProcessMonitor, ProcessRole};
use crate::{
    error::LaunchError,
    settings::{AppSettings, keys},
};

/// Everything needed to spawn one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Role of the worker.
    pub role: ProcessRole,
    /// Executable to run.
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory (inherited when `None`).
    pub working_dir: Option<PathBuf>,
    /// Web leader flag (always `false` for other roles).
    pub leader: bool,
}

impl LaunchSpec {
    /// Creates a spec with no arguments and no extra environment.
    pub fn new(role: ProcessRole, program: impl Into<PathBuf>) -> Self {
        Self {
            role,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            leader: false,
        }
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Marks this spec as the web leader (or follower).
    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }
}

/// Builds the launch specification of a role.
///
/// `leader` is only meaningful for [`ProcessRole::Web`].
pub trait CommandFactory: Send + Sync + 'static {
    /// Returns the launch specification for `role`.
    fn create(&self, role: ProcessRole, leader: bool) -> Result<LaunchSpec, LaunchError>;
}

/// Spawns workers.
#[async_trait]
pub trait ProcessLauncher: Send + Sync + 'static {
    /// Spawns the worker described by `spec`.
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessMonitor>, LaunchError>;
}

/// Environment variable carrying the web leader flag.
pub const ENV_WEB_LEADER: &str = "APPVISOR_WEB_LEADER";

/// [`CommandFactory`] reading `process.<role>.command` and `process.<role>.args`.
///
/// Settings are read at every call, so commands pick up a configuration reload.
pub struct PropsCommandFactory {
    settings: Arc<dyn AppSettings>,
}

impl PropsCommandFactory {
    /// Creates a factory over the given settings.
    pub fn new(settings: Arc<dyn AppSettings>) -> Self {
        Self { settings }
    }
}

impl CommandFactory for PropsCommandFactory {
    fn create(&self, role: ProcessRole, leader: bool) -> Result<LaunchSpec, LaunchError> {
        let props = self.settings.props();
        let command_key = keys::process_command(role);
        let program = props
            .value(&command_key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LaunchError::Command {
                role,
                reason: format!("property '{command_key}' is not set"),
            })?;

        let args = props
            .value(&keys::process_args(role))
            .map(|raw| raw.split_whitespace().map(str::to_owned).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut spec = LaunchSpec::new(role, program.trim()).with_args(args);
        if let Some(home) = props.value(keys::PATH_HOME) {
            spec = spec.with_working_dir(home);
        }
        if role == ProcessRole::Web {
            spec = spec
                .with_leader(leader)
                .with_env(ENV_WEB_LEADER, leader.to_string());
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FileSettings, Props};

    fn factory(pairs: &[(&str, &str)]) -> PropsCommandFactory {
        let mut props = Props::default();
        for (k, v) in pairs {
            props.set(*k, *v);
        }
        PropsCommandFactory::new(Arc::new(FileSettings::from_props(props)))
    }

    #[test]
    fn test_web_command_carries_leader_flag() {
        let f = factory(&[("process.web.command", "/bin/web"), ("process.web.args", "--port 9000")]);

        let leader = f.create(ProcessRole::Web, true).unwrap();
        assert_eq!(leader.program, PathBuf::from("/bin/web"));
        assert_eq!(leader.args, vec!["--port", "9000"]);
        assert!(leader.leader);
        assert!(leader.env.contains(&(ENV_WEB_LEADER.to_string(), "true".to_string())));

        let follower = f.create(ProcessRole::Web, false).unwrap();
        assert!(!follower.leader);
        assert_ne!(leader, follower);
    }

    #[test]
    fn test_missing_command_is_an_error() {
        let f = factory(&[]);
        let err = f.create(ProcessRole::Search, false).unwrap_err();
        assert_eq!(err.as_label(), "launch_command");
        assert!(err.to_string().contains("process.search.command"));
    }
}
