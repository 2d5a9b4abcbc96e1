//! Clay Engine Binding
//!
//! Thin synchronous adapter over the opaque native mesh-networking engine.
//! The engine performs all packet forwarding, encryption and peer discovery;
//! this crate only exposes the narrow call surface the tunnel controller
//! needs:
//!
//! - start / stop a network instance
//! - hand the engine the tunnel file descriptor
//! - query the last error and the current running info
//! - register stop / running-info-changed callbacks
//!
//! # Threading
//!
//! All calls are blocking and must be gated by the caller's session state
//! (the binding does not serialize `start`/`stop` itself). Registered
//! callbacks fire on an engine-controlled thread; handlers must only hand
//! off (send a message to the controller task), never run controller logic
//! in place.

mod engine;
mod error;
mod ffi;
mod mock;

pub use engine::{Engine, EngineCallback};
pub use error::EngineError;
pub use ffi::{EngineApi, NativeEngine};
pub use mock::MockEngine;
