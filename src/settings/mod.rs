//! Configuration: property map, settings provider and cluster validation.
//!
//! - [`Props`]: flat dotted-key string map with typed accessors;
//! - [`AppSettings`] / [`FileSettings`]: settings provider with restart-safe reload;
//! - [`SettingsLoader`]: TOML file + overrides + defaults;
//! - [`ClusterConfig`]: validated cluster settings (fail fast, never mutated).

mod app;
mod cluster;
pub mod keys;
mod props;

pub use app::{AppSettings, FileSettings, SettingsLoader, complete_defaults, enabled_roles, ensure_unchanged};
pub use cluster::ClusterConfig;
pub use props::Props;
