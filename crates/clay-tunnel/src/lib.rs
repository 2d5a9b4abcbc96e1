//! Clay Tunnel - session controller and settings reconciler
//!
//! The control plane of the packet-tunnel extension process. One
//! single-task controller owns the session state machine
//! (`Idle → Starting → Running → Stopping → Idle`, `Failed` terminal per
//! attempt), drives the engine binding, and reconciles virtual-interface
//! settings against the OS with at most one apply in flight and trailing
//! coalescing for bursts of change notifications.
//!
//! # Concurrency model
//!
//! Everything that touches session state runs on one controller task fed
//! by a message channel. Engine callbacks arrive on an engine-controlled
//! thread and only ever send a message; the OS settings apply runs as a
//! spawned task whose completion is posted back as a message. No locks
//! guard the state machine because nothing else can reach it.

mod controller;
mod error;
mod host;
mod provider;
mod settings;

pub use controller::{SETTLE_DELAY, SessionState, TunnelHandle};
pub use error::TunnelError;
pub use host::{MockHost, TunnelHost};
pub use provider::{CONFIG_KEY, ExtensionProvider, OPTIONS_KEY};
pub use settings::{NetworkSettingsSnapshot, desired_settings, desired_settings_for};
