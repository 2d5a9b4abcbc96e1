//! Virtual-interface settings snapshots.

use clay_room::{TunnelOptions, extract_settings};

use crate::error::TunnelError;

/// Interop defaults, shared with the other platform implementations.
const DEFAULT_IPV4: &str = "10.0.0.2";
const DEFAULT_IPV6: &str = "fd42:4242:4242::2";
const DEFAULT_DNS: [&str; 2] = ["1.1.1.1", "8.8.8.8"];

/// Smaller than the usual 1500 to avoid fragmentation inside the mesh.
const DEFAULT_MTU: u32 = 1380;

/// Value snapshot of the OS-level interface settings.
///
/// Equality is field-exact and order-sensitive; the reconciler skips the
/// OS apply when the desired snapshot equals the last applied one, so any
/// looser comparison would cause needless interface churn (or miss real
/// changes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettingsSnapshot {
    pub ipv4_addresses: Vec<String>,
    pub ipv6_addresses: Vec<String>,
    pub dns_servers: Vec<String>,
    pub mtu: u32,
}

impl Default for NetworkSettingsSnapshot {
    fn default() -> Self {
        Self {
            ipv4_addresses: vec![DEFAULT_IPV4.to_string()],
            ipv6_addresses: vec![DEFAULT_IPV6.to_string()],
            dns_servers: DEFAULT_DNS.iter().map(|s| s.to_string()).collect(),
            mtu: DEFAULT_MTU,
        }
    }
}

/// Compute the desired snapshot for a configuration document.
///
/// Starts from the interop defaults and overlays whatever the document
/// declares (DHCP pool client address, DNS servers, MTU). An undersized
/// or structureless blob is a configuration error.
pub fn desired_settings(config: &str) -> Result<NetworkSettingsSnapshot, TunnelError> {
    let extracted = extract_settings(config)?;

    let mut snapshot = NetworkSettingsSnapshot::default();
    if let Some(addr) = extracted.ipv4_address {
        snapshot.ipv4_addresses = vec![addr];
    }
    if let Some(servers) = extracted.dns_servers {
        snapshot.dns_servers = servers;
    }
    if let Some(mtu) = extracted.mtu {
        snapshot.mtu = mtu;
    }
    Ok(snapshot)
}

/// Compute the desired snapshot for a persisted options bundle.
///
/// The document's declarations apply first, then the bundle's explicit
/// overrides win over both the document and the defaults.
pub fn desired_settings_for(options: &TunnelOptions) -> Result<NetworkSettingsSnapshot, TunnelError> {
    let mut snapshot = desired_settings(&options.config)?;
    if let Some(ipv4) = &options.ipv4 {
        snapshot.ipv4_addresses = vec![ipv4.clone()];
    }
    if let Some(ipv6) = &options.ipv6 {
        snapshot.ipv6_addresses = vec![ipv6.clone()];
    }
    if !options.dns.is_empty() {
        snapshot.dns_servers = options.dns.clone();
    }
    if let Some(mtu) = options.mtu {
        snapshot.mtu = mtu;
    }
    Ok(snapshot)
}
