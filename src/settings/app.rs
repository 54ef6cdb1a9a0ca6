//! # Settings provider.
//!
//! [`AppSettings`] is what the scheduler and command builders read. [`FileSettings`]
//! is the default implementation: it loads a TOML file through a [`SettingsLoader`],
//! applies command-line overrides, and on [`AppSettings::reload`] re-reads everything
//! while refusing changes to the keys in [`keys::IMMUTABLE_ON_RESTART`].
//!
//! ## Loading
//! ```text
//! TOML file ──► flatten tables into dotted keys ──► overrides (-D key=value)
//!           ──► path.home ──► defaults ──► Props
//! ```

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::{Props, keys};
use crate::{error::ConfigError, process::ProcessRole};

/// Settings consumed by the scheduler.
pub trait AppSettings: Send + Sync + 'static {
    /// Snapshot of the current properties.
    fn props(&self) -> Props;

    /// Re-reads configuration.
    ///
    /// Fails without changing anything if the new configuration cannot be loaded or
    /// changes an immutable-at-restart property.
    fn reload(&self) -> Result<(), ConfigError>;

    /// Single property lookup.
    fn value(&self, key: &str) -> Option<String> {
        self.props().value(key)
    }

    /// True when `cluster.enabled` is set.
    fn is_cluster_enabled(&self) -> bool {
        self.props()
            .value_as_bool(keys::CLUSTER_ENABLED, false)
            .unwrap_or(false)
    }

    /// Managed roles to run on this node, in dependency order.
    fn enabled_roles(&self) -> Result<Vec<ProcessRole>, ConfigError> {
        enabled_roles(&self.props())
    }
}

/// Computes the enabled roles from properties.
///
/// Outside cluster mode every managed role runs; in cluster mode a role runs unless
/// `cluster.<role>.disabled` is set. Disabling everything is an error.
pub fn enabled_roles(props: &Props) -> Result<Vec<ProcessRole>, ConfigError> {
    let cluster = props.value_as_bool(keys::CLUSTER_ENABLED, false)?;
    let mut enabled = Vec::with_capacity(ProcessRole::MANAGED.len());
    for role in ProcessRole::MANAGED {
        let disabled = match keys::cluster_disabled(role) {
            Some(key) if cluster => props.value_as_bool(key, false)?,
            _ => false,
        };
        if !disabled {
            enabled.push(role);
        }
    }
    if enabled.is_empty() {
        return Err(ConfigError::NoProcessEnabled);
    }
    Ok(enabled)
}

/// Rejects any change of an immutable-at-restart property between `old` and `new`.
pub fn ensure_unchanged(old: &Props, new: &Props) -> Result<(), ConfigError> {
    for key in keys::IMMUTABLE_ON_RESTART {
        let before = old.value(key).unwrap_or_default();
        let after = new.value(key).unwrap_or_default();
        if before != after {
            return Err(ConfigError::ImmutableChanged {
                key,
                old: before,
                new: after,
            });
        }
    }
    Ok(())
}

/// Builds [`Props`] from a TOML file, overrides and defaults.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    home: PathBuf,
    config_file: Option<PathBuf>,
    overrides: Props,
}

impl SettingsLoader {
    /// Creates a loader rooted at `home`.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_file: None,
            overrides: Props::new(),
        }
    }

    /// Reads `path` on every load. A missing file is an error.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Forces `key` to `value`, whatever the file says.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.set(key, value);
        self
    }

    /// Loads and completes properties.
    pub fn load(&self) -> Result<Props, ConfigError> {
        let mut props = match &self.config_file {
            Some(path) => read_toml(path)?,
            None => Props::new(),
        };
        props.merge(self.overrides.clone());
        props.set_default(keys::PATH_HOME, &self.home.to_string_lossy());
        complete_defaults(&mut props);
        Ok(props)
    }
}

fn read_toml(path: &Path) -> Result<Props, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let mut props = Props::new();
    flatten("", &table, &mut props);
    Ok(props)
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut Props) {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::Table(inner) => flatten(&key, inner, out),
            other => {
                out.set(key, scalar(other));
            }
        }
    }
}

fn scalar(v: &toml::Value) -> String {
    match v {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Fills in every key the supervisor reads.
pub fn complete_defaults(props: &mut Props) {
    let home = PathBuf::from(props.value_or(keys::PATH_HOME, "."));
    for (key, dir) in [
        (keys::PATH_DATA, "data"),
        (keys::PATH_TEMP, "temp"),
        (keys::PATH_LOGS, "logs"),
    ] {
        props.set_default(key, &home.join(dir).to_string_lossy());
    }
    props.set_default(keys::CLUSTER_ENABLED, "false");
    props.set_default(keys::CLUSTER_PORT, &keys::DEFAULT_CLUSTER_PORT.to_string());
    props.set_default(keys::CLUSTER_PORT_AUTOINCREMENT, "false");
    props.set_default(keys::SCHEDULER_WATCHER_INTERVAL_MS, "500");
    props.set_default(keys::SCHEDULER_STOP_TIMEOUT_MS, "60000");
}

/// [`AppSettings`] backed by a [`SettingsLoader`].
#[derive(Debug)]
pub struct FileSettings {
    loader: Option<SettingsLoader>,
    props: RwLock<Props>,
}

impl FileSettings {
    /// Loads settings once; later reloads use the same loader.
    pub fn load(loader: SettingsLoader) -> Result<Self, ConfigError> {
        let props = loader.load()?;
        Ok(Self {
            loader: Some(loader),
            props: RwLock::new(props),
        })
    }

    /// Fixed settings; [`AppSettings::reload`] keeps them as they are.
    pub fn from_props(props: Props) -> Self {
        Self {
            loader: None,
            props: RwLock::new(props),
        }
    }
}

impl AppSettings for FileSettings {
    fn props(&self) -> Props {
        self.props.read().clone()
    }

    fn reload(&self) -> Result<(), ConfigError> {
        let Some(loader) = &self.loader else {
            return Ok(());
        };
        let reloaded = loader.load()?;
        let mut current = self.props.write();
        ensure_unchanged(&current, &reloaded)?;
        *current = reloaded;
        tracing::info!(entries = current.len(), "configuration reloaded");
        Ok(())
    }
}
