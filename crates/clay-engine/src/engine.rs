//! The `Engine` trait: the seam between the tunnel controller and the
//! native mesh engine.
//!
//! Production code uses [`NativeEngine`](crate::NativeEngine); tests use
//! [`MockEngine`](crate::MockEngine).

use std::os::fd::RawFd;

use crate::error::EngineError;

/// Callback handed to the engine for stop / running-info-changed events.
///
/// Invoked on an engine-controlled thread. Implementations must be cheap
/// and non-blocking: send a message and return.
pub type EngineCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Narrow synchronous call surface of the native mesh engine.
pub trait Engine: Send + Sync {
    /// Start a network instance from a configuration document.
    ///
    /// Blocking. Must not be called twice without an intervening [`stop`]
    /// (callers gate via their session state).
    ///
    /// [`stop`]: Engine::stop
    fn start(&self, config: &str) -> Result<(), EngineError>;

    /// Stop the running network instance.
    ///
    /// Idempotent by contract, but the native layer is not trusted to
    /// guarantee it; callers still gate via session state.
    fn stop(&self) -> Result<(), EngineError>;

    /// Hand the engine the tunnel file descriptor.
    ///
    /// Required after every successful OS settings apply that changes the
    /// virtual interface; the engine reads and writes packets only through
    /// this descriptor.
    fn set_tun_fd(&self, fd: RawFd) -> Result<(), EngineError>;

    /// Fetch the most recent error message recorded by the engine, if any.
    fn last_error(&self) -> Option<String>;

    /// Fetch the current running info document.
    fn running_info(&self) -> Result<String, EngineError>;

    /// Register the stop callback, replacing any previous handler.
    fn on_stop(&self, handler: EngineCallback) -> Result<(), EngineError>;

    /// Register the running-info-changed callback, replacing any previous
    /// handler.
    fn on_running_info(&self, handler: EngineCallback) -> Result<(), EngineError>;
}
