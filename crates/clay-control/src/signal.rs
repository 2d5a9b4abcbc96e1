//! Wake signal: the out-of-band "re-check the store" nudge.
//!
//! Delivery is not guaranteed and carries no payload; the responder keeps
//! a polling fallback, so the signal only shaves latency.

use std::sync::Arc;

use tokio::sync::Notify;

/// One-way wake notification across the process boundary.
pub trait WakeSignal: Send + Sync {
    /// Raise the signal. Never blocks.
    fn raise(&self);

    /// Wait until the signal is next raised.
    fn wait(&self) -> impl Future<Output = ()> + Send;
}

/// In-process signal over [`tokio::sync::Notify`].
///
/// Used in tests and when both endpoints share a process. A raise with no
/// waiter parks one permit, so a wake ahead of the first wait is not lost.
#[derive(Clone, Default)]
pub struct LocalSignal {
    notify: Arc<Notify>,
}

impl LocalSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WakeSignal for LocalSignal {
    fn raise(&self) {
        self.notify.notify_one();
    }

    fn wait(&self) -> impl Future<Output = ()> + Send {
        let notify = self.notify.clone();
        async move { notify.notified().await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raise_before_wait_is_not_lost() {
        let signal = LocalSignal::new();
        signal.raise();

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("parked permit should satisfy the wait");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_raise() {
        let signal = LocalSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise();

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("raise should wake the waiter")
            .unwrap();
    }
}
