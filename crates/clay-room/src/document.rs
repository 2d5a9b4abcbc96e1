//! Engine configuration document: generation and field extraction.
//!
//! The document is the cross-platform wire format handed to the engine.
//! It looks like TOML but is not (listener entries are dash-prefixed
//! lines), so both directions are handled with a line-oriented scanner
//! instead of a TOML crate. The section set and defaults are fixed by the
//! interop contract with the other platform implementations.

use crate::code::RoomCode;
use crate::code::{network_name, network_secret};
use crate::error::RoomError;

/// Shortest blob worth scanning: one section header plus one key line.
const MIN_CONFIG_LEN: usize = "[flags]\nx=1".len();

/// Listener port shared by all platforms.
const LISTENER_PORT: u16 = 11010;

/// RPC / scaffolding port shared by all platforms.
const RPC_PORT: u16 = 13448;

/// DHCP pool shared by all platforms.
const DHCP_POOL: &str = "10.14.0.0/16";

/// Builder for the engine configuration document.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    network_name: String,
    network_secret: String,
    host: bool,
}

impl ConfigDocument {
    /// Document for a room identified by `code`.
    ///
    /// `room_name` may be empty; the name then derives from the code.
    pub fn for_room(room_name: &str, code: &RoomCode) -> Self {
        Self {
            network_name: network_name(room_name, code),
            network_secret: network_secret(code),
            host: false,
        }
    }

    /// Enable the host-only scaffolding section.
    pub fn host(mut self) -> Self {
        self.host = true;
        self
    }

    /// Render the document text handed to the engine.
    pub fn render(&self) -> String {
        let mut doc = String::new();
        doc.push_str("[flags]\nno_tun = false\ndhcp = true\n");

        if self.host {
            doc.push_str(&format!(
                "\n[scaffolding]\nenable = true\nport = {RPC_PORT}\n"
            ));
        }

        doc.push_str(&format!(
            "\n[network_identity]\nnetwork_name = \"{}\"\nnetwork_secret = \"{}\"\n",
            self.network_name, self.network_secret
        ));
        doc.push_str(&format!(
            "\n[listeners]\n- \"udp://0.0.0.0:{LISTENER_PORT}\"\n- \"tcp://0.0.0.0:{LISTENER_PORT}\"\n"
        ));
        doc.push_str(&format!("\n[dhcp]\nipv4 = \"{DHCP_POOL}\"\n"));
        doc.push_str(&format!("\n[rpc]\nlisten_port = {RPC_PORT}\n"));
        doc.push_str("\n[virtual_dns]\nenable = true\n");
        doc
    }
}

/// Fields the settings reconciler reads out of a config document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSettings {
    /// Client address carved out of the DHCP pool, if one is declared.
    pub ipv4_address: Option<String>,
    /// DNS servers from a `[dns]` section, if present.
    pub dns_servers: Option<Vec<String>>,
    /// Explicit `mtu = N` override, if present.
    pub mtu: Option<u32>,
}

/// Reject blobs that cannot possibly be a config document.
///
/// This is the boundary check for the controller's start path: too short
/// or missing any section header means a configuration error, never a
/// crash further down.
pub fn validate_config(config: &str) -> Result<(), RoomError> {
    let trimmed = config.trim();
    if trimmed.len() < MIN_CONFIG_LEN {
        return Err(RoomError::InvalidConfig(format!(
            "document too short ({} bytes)",
            trimmed.len()
        )));
    }
    if !trimmed.lines().any(|l| {
        let l = l.trim();
        l.starts_with('[') && l.ends_with(']')
    }) {
        return Err(RoomError::InvalidConfig("no section header found".into()));
    }
    Ok(())
}

/// Scan a config document for the fields that feed interface settings.
pub fn extract_settings(config: &str) -> Result<ExtractedSettings, RoomError> {
    validate_config(config)?;

    let mut out = ExtractedSettings::default();
    let mut section = String::new();

    for line in config.lines() {
        let line = line.trim();
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].to_string();
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        match (section.as_str(), key) {
            (_, "mtu") => {
                if let Ok(mtu) = value.parse::<u32>() {
                    out.mtu = Some(mtu);
                }
            }
            ("dhcp", "ipv4") => {
                if let Some(addr) = client_address(unquote(value)) {
                    out.ipv4_address = Some(addr);
                }
            }
            ("dns", "servers") => {
                let servers: Vec<String> = value
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .split(',')
                    .map(|s| unquote(s.trim()).to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if !servers.is_empty() {
                    out.dns_servers = Some(servers);
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// Carve a client address out of a DHCP pool like `10.14.0.0/16`.
///
/// Interop behavior: base address with the last octet bumped by 2 (skips
/// the network and gateway addresses), clamped back to 10 past 254.
fn client_address(pool: &str) -> Option<String> {
    let base = pool.split('/').next()?;
    let mut octets: Vec<u16> = base
        .split('.')
        .map(|o| o.parse::<u16>().ok())
        .collect::<Option<Vec<_>>>()?;
    if octets.len() != 4 || octets.iter().any(|&o| o > 255) {
        return None;
    }
    octets[3] += 2;
    if octets[3] > 254 {
        octets[3] = 10;
    }
    Some(
        octets
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join("."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_document_has_interop_sections() {
        let code = RoomCode::parse("U/ABCD-EFGH-IJKL-MNOP").unwrap();
        let doc = ConfigDocument::for_room("Alpha", &code).render();

        assert!(doc.contains("[flags]"));
        assert!(doc.contains("network_name = \"Alpha\""));
        assert!(doc.contains("network_secret = \"abcdefghijklmnop0000000000000000\""));
        assert!(doc.contains("- \"udp://0.0.0.0:11010\""));
        assert!(doc.contains("- \"tcp://0.0.0.0:11010\""));
        assert!(doc.contains("ipv4 = \"10.14.0.0/16\""));
        assert!(doc.contains("listen_port = 13448"));
        assert!(!doc.contains("[scaffolding]"));
    }

    #[test]
    fn test_host_document_adds_scaffolding() {
        let code = RoomCode::parse("U/ABCD-EFGH-IJKL-MNOP").unwrap();
        let doc = ConfigDocument::for_room("", &code).host().render();

        assert!(doc.contains("[scaffolding]"));
        assert!(doc.contains("network_name = \"Clay-ABCDEFGH\""));
    }

    #[test]
    fn test_rendered_document_passes_validation_and_extraction() {
        let code = RoomCode::generate();
        let doc = ConfigDocument::for_room("Room", &code).render();

        let extracted = extract_settings(&doc).unwrap();
        assert_eq!(extracted.ipv4_address.as_deref(), Some("10.14.0.2"));
        assert_eq!(extracted.mtu, None);
        assert_eq!(extracted.dns_servers, None);
    }

    #[test]
    fn test_short_blob_is_a_config_error_not_a_panic() {
        assert!(matches!(
            validate_config(""),
            Err(RoomError::InvalidConfig(_))
        ));
        assert!(matches!(
            validate_config("x"),
            Err(RoomError::InvalidConfig(_))
        ));
        assert!(matches!(
            extract_settings("no sections here, just text"),
            Err(RoomError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_mtu_and_dns_extraction() {
        let doc = "[flags]\nmtu = 1280\n\n[dns]\nservers = [\"9.9.9.9\", \"1.0.0.1\"]\n";
        let extracted = extract_settings(doc).unwrap();

        assert_eq!(extracted.mtu, Some(1280));
        assert_eq!(
            extracted.dns_servers,
            Some(vec!["9.9.9.9".to_string(), "1.0.0.1".to_string()])
        );
    }

    #[test]
    fn test_client_address_clamps_past_254() {
        assert_eq!(client_address("10.14.0.0/16").as_deref(), Some("10.14.0.2"));
        assert_eq!(client_address("10.14.0.254/24").as_deref(), Some("10.14.0.10"));
        assert_eq!(client_address("not-an-address"), None);
    }
}
