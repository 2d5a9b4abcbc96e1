//! Clay Room - shared network identity
//!
//! Rooms are the unit of interop between platform implementations: a
//! human-shareable code (`U/XXXX-XXXX-XXXX-XXXX`) deterministically seeds
//! the mesh network's name and secret, so independent implementations that
//! exchange only the code compute the same identity.
//!
//! This crate owns the three interop contracts:
//!
//! - the room-code format and its base-32 alphabet (`A–Z`, `2–7`)
//! - the derivation of the network secret from a code
//! - the engine configuration document (a fixed pseudo-TOML dialect; the
//!   dash-prefixed listener lines are not valid TOML, so the document is
//!   built and scanned by hand rather than through a TOML crate)

mod code;
mod document;
mod error;
mod options;

pub use code::{RoomCode, network_name, network_secret};
pub use document::{ConfigDocument, ExtractedSettings, extract_settings, validate_config};
pub use error::RoomError;
pub use options::{LogLevel, TunnelOptions};
