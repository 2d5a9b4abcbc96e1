//! Persisted tunnel options.
//!
//! The GUI process stores these alongside the generated config document;
//! the JSON shape is shared with the other platform implementations, so
//! field names stay `camelCase`-free and optional fields are omitted when
//! unset.

use serde::{Deserialize, Serialize};

/// Engine log verbosity, serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Options bundle persisted next to the config document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelOptions {
    /// Engine configuration document.
    pub config: String,
    /// Explicit IPv4 address override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    /// Explicit IPv6 address override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    /// Explicit MTU override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    /// Extra routes to install.
    #[serde(default)]
    pub routes: Vec<String>,
    /// DNS servers to install.
    #[serde(default)]
    pub dns: Vec<String>,
    /// Engine log verbosity.
    #[serde(default)]
    pub log_level: LogLevel,
}
