//! # Cluster settings validation.
//!
//! [`ClusterConfig::from_props`] turns raw properties into a validated, immutable value
//! before anything else runs. When cluster mode is disabled nothing is validated and
//! the defaults are returned.
//!
//! ## Rules (cluster enabled)
//! - `cluster.port` must be an integer in `[1-65535]` (default 9003);
//! - `cluster.name` must be non-empty;
//! - every entry of `cluster.interfaces` must be an address of this machine;
//! - every entry of `cluster.members` is `host` or `host:port`; a bare host gets the
//!   configured port.

use std::net::{IpAddr, Ipv6Addr, UdpSocket};

use super::{Props, keys};
use crate::error::ConfigError;

/// Validated cluster settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    enabled: bool,
    name: String,
    port: u16,
    port_autoincrement: bool,
    interfaces: Vec<IpAddr>,
    members: Vec<String>,
}

impl Default for ClusterConfig {
    /// Cluster disabled, port 9003, everything else empty.
    fn default() -> Self {
        Self {
            enabled: false,
            name: String::new(),
            port: keys::DEFAULT_CLUSTER_PORT,
            port_autoincrement: false,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster settings, failing on the first invalid property.
    pub fn from_props(props: &Props) -> Result<Self, ConfigError> {
        let enabled = props.value_as_bool(keys::CLUSTER_ENABLED, false)?;
        if !enabled {
            return Ok(Self::default());
        }

        let port = parse_port(props.value(keys::CLUSTER_PORT))?;

        let name = props.value(keys::CLUSTER_NAME).unwrap_or_default();
        if name.is_empty() {
            return Err(ConfigError::MissingClusterName {
                key: keys::CLUSTER_NAME,
            });
        }

        let interfaces = split_list(props.value(keys::CLUSTER_INTERFACES))
            .map(check_interface)
            .collect::<Result<Vec<_>, _>>()?;

        let mut members: Vec<String> = Vec::new();
        for raw in split_list(props.value(keys::CLUSTER_MEMBERS)) {
            let member = normalize_member(raw, port)?;
            if !members.contains(&member) {
                members.push(member);
            }
        }

        Ok(Self {
            enabled,
            name,
            port,
            port_autoincrement: props.value_as_bool(keys::CLUSTER_PORT_AUTOINCREMENT, false)?,
            interfaces,
            members,
        })
    }

    /// True when cluster mode is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cluster name (empty when disabled).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gossip port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True if the next ports may be tried when `port` is taken.
    pub fn is_port_autoincrement(&self) -> bool {
        self.port_autoincrement
    }

    /// Local addresses to bind to (empty means "any").
    pub fn interfaces(&self) -> &[IpAddr] {
        &self.interfaces
    }

    /// Seed members as `host:port`.
    pub fn members(&self) -> &[String] {
        &self.members
    }
}

fn split_list(raw: Option<String>) -> impl Iterator<Item = String> {
    raw.into_iter()
        .flat_map(|v| v.split(',').map(str::trim).map(str::to_owned).collect::<Vec<_>>())
        .filter(|s| !s.is_empty())
}

fn parse_port(raw: Option<String>) -> Result<u16, ConfigError> {
    let Some(raw) = raw else {
        return Ok(keys::DEFAULT_CLUSTER_PORT);
    };
    match raw.parse::<i64>() {
        Ok(p) if (1..=i64::from(u16::MAX)).contains(&p) => Ok(p as u16),
        _ => Err(ConfigError::InvalidPort {
            key: keys::CLUSTER_PORT,
            value: raw,
        }),
    }
}

fn check_interface(raw: String) -> Result<IpAddr, ConfigError> {
    let unavailable = |value: String| ConfigError::InterfaceUnavailable {
        key: keys::CLUSTER_INTERFACES,
        value,
    };
    let Ok(ip) = raw.parse::<IpAddr>() else {
        return Err(unavailable(raw));
    };
    // Binding an ephemeral port only succeeds for addresses owned by a local interface.
    match UdpSocket::bind((ip, 0)) {
        Ok(_) => Ok(ip),
        Err(_) => Err(unavailable(raw)),
    }
}

fn normalize_member(raw: String, default_port: u16) -> Result<String, ConfigError> {
    if raw.parse::<Ipv6Addr>().is_ok() {
        return Ok(format!("[{raw}]:{default_port}"));
    }
    let explicit_port = if raw.starts_with('[') {
        raw.split_once("]:").map(|(_, p)| p)
    } else {
        raw.rsplit_once(':').map(|(_, p)| p)
    };
    match explicit_port {
        None => Ok(format!("{raw}:{default_port}")),
        Some(p) => match p.parse::<u16>() {
            Ok(n) if n > 0 => Ok(raw),
            _ => Err(ConfigError::InvalidValue {
                key: keys::CLUSTER_MEMBERS.to_owned(),
                value: raw.clone(),
                reason: "member port must be in [1-65535]".into(),
            }),
        },
    }
}
