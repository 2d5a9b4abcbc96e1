//! The `TunnelHost` trait: the seam to the OS packet-tunnel object.
//!
//! The host applies interface settings (addresses, routes, DNS, MTU) and
//! exposes the tunnel file descriptor of the packet-flow object. The
//! controller guarantees `apply_settings` is never invoked twice
//! concurrently.

use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::settings::NetworkSettingsSnapshot;

/// OS-level packet-tunnel surface.
pub trait TunnelHost: Send + Sync {
    /// Apply interface settings. Resolves when the OS reports the apply
    /// outcome; the error string is the OS-provided reason.
    fn apply_settings(
        &self,
        snapshot: &NetworkSettingsSnapshot,
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Tunnel file descriptor of the packet-flow object, if obtainable.
    fn tun_fd(&self) -> Option<RawFd>;
}

#[derive(Default)]
struct Inner {
    applied: Vec<NetworkSettingsSnapshot>,
    fail_next: Option<String>,
    apply_delay: Duration,
    tun_fd: Option<RawFd>,
}

/// Scriptable [`TunnelHost`] for tests: records applied snapshots,
/// injects failures and apply latency.
#[derive(Clone)]
pub struct MockHost {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockHost {
    fn default() -> Self {
        let inner = Inner {
            tun_fd: Some(7),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next apply fail with the given OS reason.
    pub fn fail_next_apply(&self, reason: &str) {
        self.inner.lock().unwrap().fail_next = Some(reason.to_string());
    }

    /// Add latency to every apply (to hold a reconciliation in flight).
    pub fn set_apply_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().apply_delay = delay;
    }

    /// Pretend the packet-flow object exposes no descriptor.
    pub fn clear_tun_fd(&self) {
        self.inner.lock().unwrap().tun_fd = None;
    }

    /// Snapshots applied so far, in order.
    pub fn applied(&self) -> Vec<NetworkSettingsSnapshot> {
        self.inner.lock().unwrap().applied.clone()
    }

    pub fn apply_count(&self) -> usize {
        self.inner.lock().unwrap().applied.len()
    }
}

impl TunnelHost for MockHost {
    fn apply_settings(
        &self,
        snapshot: &NetworkSettingsSnapshot,
    ) -> impl Future<Output = Result<(), String>> + Send {
        let inner = self.inner.clone();
        let snapshot = snapshot.clone();
        async move {
            let (delay, failure) = {
                let mut guard = inner.lock().unwrap();
                (guard.apply_delay, guard.fail_next.take())
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(reason) = failure {
                return Err(reason);
            }
            inner.lock().unwrap().applied.push(snapshot);
            Ok(())
        }
    }

    fn tun_fd(&self) -> Option<RawFd> {
        self.inner.lock().unwrap().tun_fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_host_records_applies() {
        let host = MockHost::new();
        let snapshot = NetworkSettingsSnapshot::default();

        host.apply_settings(&snapshot).await.unwrap();
        assert_eq!(host.applied(), vec![snapshot]);
        assert_eq!(host.tun_fd(), Some(7));
    }

    #[tokio::test]
    async fn test_mock_host_injected_failure_is_one_shot() {
        let host = MockHost::new();
        host.fail_next_apply("settings rejected");

        let snapshot = NetworkSettingsSnapshot::default();
        assert_eq!(
            host.apply_settings(&snapshot).await,
            Err("settings rejected".to_string())
        );
        assert!(host.apply_settings(&snapshot).await.is_ok());
        assert_eq!(host.apply_count(), 1);
    }
}
