//! Native engine binding over a C vtable.
//!
//! The engine ships as an opaque native library with a C ABI. Every string
//! it hands back is owned by the callee and must be released after copying;
//! [`NativeEngine`] funnels all of those through one scoped helper so no
//! exit path can leak or double-free.
//!
//! Callbacks on the C side carry no user data pointer, so handler closures
//! live in process-global slots and the engine is given fixed `extern "C"`
//! trampolines. There is consequently at most one `NativeEngine` worth of
//! handlers per process, which matches the one-instance contract of the
//! engine itself.

use std::ffi::{CStr, CString, c_char, c_int};
use std::os::fd::RawFd;
use std::sync::Mutex;

use tracing::warn;

use crate::engine::{Engine, EngineCallback};
use crate::error::EngineError;

/// C vtable of the native engine.
///
/// Function pointer fields mirror the engine's exported symbols. All `err`
/// and out-string parameters receive callee-allocated NUL-terminated
/// strings that must be released with `free_string`.
#[derive(Clone, Copy)]
pub struct EngineApi {
    pub run_network_instance:
        unsafe extern "C" fn(cfg: *const c_char, err: *mut *const c_char) -> c_int,
    pub stop_network_instance: unsafe extern "C" fn() -> c_int,
    pub set_tun_fd: unsafe extern "C" fn(fd: c_int, err: *mut *const c_char) -> c_int,
    pub get_latest_error_msg:
        unsafe extern "C" fn(msg: *mut *const c_char, err: *mut *const c_char) -> c_int,
    pub get_running_info:
        unsafe extern "C" fn(info: *mut *const c_char, err: *mut *const c_char) -> c_int,
    pub register_stop_callback:
        unsafe extern "C" fn(cb: Option<extern "C" fn()>, err: *mut *const c_char) -> c_int,
    pub register_running_info_callback:
        unsafe extern "C" fn(cb: Option<extern "C" fn()>, err: *mut *const c_char) -> c_int,
    pub free_string: unsafe extern "C" fn(s: *const c_char),
}

static STOP_HANDLER: Mutex<Option<EngineCallback>> = Mutex::new(None);
static RUNNING_INFO_HANDLER: Mutex<Option<EngineCallback>> = Mutex::new(None);

extern "C" fn stop_trampoline() {
    // Engine thread. Take the lock briefly, run the handler outside of any
    // engine-visible state.
    let guard = STOP_HANDLER.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handler) = guard.as_ref() {
        handler();
    } else {
        warn!("engine stop callback fired with no handler registered");
    }
}

extern "C" fn running_info_trampoline() {
    let guard = RUNNING_INFO_HANDLER.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handler) = guard.as_ref() {
        handler();
    } else {
        warn!("engine running-info callback fired with no handler registered");
    }
}

/// [`Engine`] implementation calling through an [`EngineApi`] vtable.
pub struct NativeEngine {
    api: EngineApi,
}

impl NativeEngine {
    /// Wrap a resolved vtable.
    pub fn new(api: EngineApi) -> Self {
        Self { api }
    }

    /// Copy a callee-owned C string and release the original.
    ///
    /// Must be called exactly once per pointer the engine hands out, on
    /// every exit path. Returns `None` for null pointers.
    fn take_owned(&self, ptr: *const c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let copied = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { (self.api.free_string)(ptr) };
        Some(copied)
    }

    /// Run a vtable call that reports failure through an out error string.
    fn checked<F>(&self, call: F) -> Result<(), EngineError>
    where
        F: FnOnce(*mut *const c_char) -> c_int,
    {
        let mut err: *const c_char = std::ptr::null();
        let status = call(&mut err);
        let err = self.take_owned(err);
        if status == 0 {
            Ok(())
        } else {
            Err(EngineError::from_native(err))
        }
    }
}

impl Engine for NativeEngine {
    fn start(&self, config: &str) -> Result<(), EngineError> {
        let cfg = CString::new(config)
            .map_err(|_| EngineError::InvalidInput("config contains NUL byte".into()))?;
        self.checked(|err| unsafe { (self.api.run_network_instance)(cfg.as_ptr(), err) })
    }

    fn stop(&self) -> Result<(), EngineError> {
        let status = unsafe { (self.api.stop_network_instance)() };
        if status == 0 {
            Ok(())
        } else {
            Err(EngineError::from_native(self.last_error()))
        }
    }

    fn set_tun_fd(&self, fd: RawFd) -> Result<(), EngineError> {
        self.checked(|err| unsafe { (self.api.set_tun_fd)(fd, err) })
    }

    fn last_error(&self) -> Option<String> {
        let mut msg: *const c_char = std::ptr::null();
        let mut err: *const c_char = std::ptr::null();
        let status = unsafe { (self.api.get_latest_error_msg)(&mut msg, &mut err) };
        let msg = self.take_owned(msg);
        let err = self.take_owned(err);
        if status == 0 {
            msg
        } else {
            if let Some(err) = err {
                warn!(error = %err, "get_latest_error_msg failed");
            }
            None
        }
    }

    fn running_info(&self) -> Result<String, EngineError> {
        let mut info: *const c_char = std::ptr::null();
        let mut err: *const c_char = std::ptr::null();
        let status = unsafe { (self.api.get_running_info)(&mut info, &mut err) };
        let info = self.take_owned(info);
        let err = self.take_owned(err);
        if status == 0 {
            info.ok_or(EngineError::Unknown)
        } else {
            Err(EngineError::from_native(err))
        }
    }

    fn on_stop(&self, handler: EngineCallback) -> Result<(), EngineError> {
        // Replacing the slot first makes re-registration handler-idempotent
        // even if the native call below re-registers the trampoline.
        *STOP_HANDLER.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
        self.checked(|err| unsafe {
            (self.api.register_stop_callback)(Some(stop_trampoline), err)
        })
    }

    fn on_running_info(&self, handler: EngineCallback) -> Result<(), EngineError> {
        *RUNNING_INFO_HANDLER.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
        self.checked(|err| unsafe {
            (self.api.register_running_info_callback)(Some(running_info_trampoline), err)
        })
    }
}
