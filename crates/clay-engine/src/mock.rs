//! In-memory engine for tests.

use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};

use crate::engine::{Engine, EngineCallback};
use crate::error::EngineError;

#[derive(Default)]
struct Inner {
    started: bool,
    calls: Vec<String>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    fail_set_tun_fd: Option<String>,
    last_error: Option<String>,
    running_info: String,
    stop_handler: Option<EngineCallback>,
    running_info_handler: Option<EngineCallback>,
}

/// Scriptable [`Engine`] used across the workspace's tests.
///
/// Records every call, supports injected failures per operation, and lets
/// tests fire the registered callbacks as the native engine would (from an
/// arbitrary thread).
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<Mutex<Inner>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` fail with the given message.
    pub fn fail_start(&self, msg: &str) {
        self.inner.lock().unwrap().fail_start = Some(msg.to_string());
    }

    /// Make every `stop` fail with the given message.
    pub fn fail_stop(&self, msg: &str) {
        self.inner.lock().unwrap().fail_stop = Some(msg.to_string());
    }

    /// Make every `set_tun_fd` fail with the given message.
    pub fn fail_set_tun_fd(&self, msg: &str) {
        self.inner.lock().unwrap().fail_set_tun_fd = Some(msg.to_string());
    }

    /// Set the message `last_error` returns.
    pub fn set_last_error(&self, msg: &str) {
        self.inner.lock().unwrap().last_error = Some(msg.to_string());
    }

    /// Set the document `running_info` returns.
    pub fn set_running_info(&self, info: &str) {
        self.inner.lock().unwrap().running_info = info.to_string();
    }

    /// Recorded calls, in order (`"start"`, `"stop"`, `"set_tun_fd:<fd>"`).
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().unwrap().started
    }

    /// Fire the registered stop callback, as the engine would on an
    /// unrecoverable internal error.
    pub fn fire_stop(&self) {
        let handler = {
            let mut inner = self.inner.lock().unwrap();
            inner.started = false;
            inner.stop_handler.take()
        };
        if let Some(handler) = handler {
            handler();
            self.inner.lock().unwrap().stop_handler = Some(handler);
        }
    }

    /// Fire the registered running-info-changed callback.
    pub fn fire_running_info(&self) {
        let handler = self.inner.lock().unwrap().running_info_handler.take();
        if let Some(handler) = handler {
            handler();
            self.inner.lock().unwrap().running_info_handler = Some(handler);
        }
    }
}

impl Engine for MockEngine {
    fn start(&self, _config: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("start".into());
        if let Some(msg) = inner.fail_start.take() {
            inner.last_error = Some(msg.clone());
            return Err(EngineError::Native(msg));
        }
        inner.started = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("stop".into());
        inner.started = false;
        if let Some(msg) = inner.fail_stop.clone() {
            return Err(EngineError::Native(msg));
        }
        Ok(())
    }

    fn set_tun_fd(&self, fd: RawFd) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("set_tun_fd:{fd}"));
        if let Some(msg) = inner.fail_set_tun_fd.clone() {
            return Err(EngineError::Native(msg));
        }
        Ok(())
    }

    fn last_error(&self) -> Option<String> {
        self.inner.lock().unwrap().last_error.clone()
    }

    fn running_info(&self) -> Result<String, EngineError> {
        Ok(self.inner.lock().unwrap().running_info.clone())
    }

    fn on_stop(&self, handler: EngineCallback) -> Result<(), EngineError> {
        self.inner.lock().unwrap().stop_handler = Some(handler);
        Ok(())
    }

    fn on_running_info(&self, handler: EngineCallback) -> Result<(), EngineError> {
        self.inner.lock().unwrap().running_info_handler = Some(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let engine = MockEngine::new();
        engine.start("cfg").unwrap();
        engine.set_tun_fd(7).unwrap();
        engine.stop().unwrap();

        assert_eq!(engine.calls(), vec!["start", "set_tun_fd:7", "stop"]);
        assert!(!engine.is_started());
    }

    #[test]
    fn test_injected_start_failure_sets_last_error() {
        let engine = MockEngine::new();
        engine.fail_start("no route to peer");

        assert!(engine.start("cfg").is_err());
        assert_eq!(engine.last_error().as_deref(), Some("no route to peer"));

        // Failure is one-shot.
        engine.start("cfg").unwrap();
    }

    #[test]
    fn test_fire_stop_reaches_handler() {
        let engine = MockEngine::new();
        let fired = Arc::new(Mutex::new(false));

        let f = fired.clone();
        engine
            .on_stop(Box::new(move || {
                *f.lock().unwrap() = true;
            }))
            .unwrap();

        engine.fire_stop();
        assert!(*fired.lock().unwrap());
    }
}
