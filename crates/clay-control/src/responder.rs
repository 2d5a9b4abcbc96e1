//! Responder side of the control channel.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::message::{ControlMessage, ControlReply, REPLY_KEY, REQUEST_KEY, error_reply};
use crate::signal::WakeSignal;
use crate::store::SharedStore;

/// Store poll cadence when no wake signal arrives.
///
/// Correctness never depends on the wake signal; this tick alone keeps the
/// responder live, the signal just makes it prompt.
pub const RESPONDER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Dispatches a command and produces the reply payload.
///
/// Failures are encoded in the payload itself (see
/// [`error_reply`](crate::error_reply)); the responder never crashes over
/// a bad command.
pub trait ControlHandler: Send + Sync {
    fn handle(&self, command: &str) -> impl Future<Output = String> + Send;
}

/// Reads commands from the request cell and writes correlated replies.
pub struct ControlResponder<S, W> {
    store: Arc<S>,
    signal: W,
    poll_interval: Duration,
    last_handled: Option<u64>,
}

impl<S: SharedStore, W: WakeSignal> ControlResponder<S, W> {
    pub fn new(store: Arc<S>, signal: W) -> Self {
        Self {
            store,
            signal,
            poll_interval: RESPONDER_POLL_INTERVAL,
            last_handled: None,
        }
    }

    /// Override the polling cadence (tests use a short tick).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Serve forever. Run inside `select!` against a shutdown future.
    pub async fn run<H: ControlHandler>(mut self, handler: &H) {
        loop {
            tokio::select! {
                _ = self.signal.wait() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            self.poll_once(handler).await;
        }
    }

    /// Check the request cell once and answer anything new.
    ///
    /// The store is the source of truth: this is safe to call on any
    /// schedule, with or without a preceding wake.
    pub async fn poll_once<H: ControlHandler>(&mut self, handler: &H) {
        let Some(raw) = self.store.get(REQUEST_KEY) else {
            return;
        };

        let message = match ControlMessage::decode(&raw) {
            Ok(message) => message,
            Err(e) => {
                // Unframeable cell: answer with an uncorrelated error so
                // the writer at least observes *something*, and clear the
                // cell so we do not re-answer it every tick.
                warn!(error = %e, "malformed control request");
                self.store.remove(REQUEST_KEY);
                self.store.set(
                    REPLY_KEY,
                    &ControlReply {
                        id: 0,
                        payload: error_reply("malformed control message"),
                    }
                    .encode(),
                );
                return;
            }
        };

        if self.last_handled == Some(message.id) {
            return;
        }

        debug!(id = message.id, command = %message.command, "control dispatch");
        let payload = handler.handle(&message.command).await;
        self.last_handled = Some(message.id);
        self.store.set(
            REPLY_KEY,
            &ControlReply {
                id: message.id,
                payload,
            }
            .encode(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::requester::ControlRequester;
    use crate::signal::{LocalSignal, WakeSignal};
    use crate::store::MemoryStore;

    /// Echoes commands back; `boom` fails; `slow` answers, but late.
    struct EchoHandler;

    impl ControlHandler for EchoHandler {
        async fn handle(&self, command: &str) -> String {
            match command {
                "boom" => error_reply("it broke"),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "late:slow".into()
                }
                other => format!("echo:{other}"),
            }
        }
    }

    /// A wake signal that drops every raise, to prove polling alone works.
    #[derive(Clone, Default)]
    struct DeafSignal;

    impl WakeSignal for DeafSignal {
        fn raise(&self) {}
        fn wait(&self) -> impl Future<Output = ()> + Send {
            std::future::pending::<()>()
        }
    }

    fn channel() -> (
        ControlRequester<MemoryStore, LocalSignal>,
        ControlResponder<MemoryStore, LocalSignal>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let signal = LocalSignal::new();
        (
            ControlRequester::new(store.clone(), signal.clone()),
            ControlResponder::new(store, signal).with_poll_interval(Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn test_request_reply_roundtrip() {
        let (requester, responder) = channel();
        tokio::spawn(async move { responder.run(&EchoHandler).await });

        let reply = requester.request("hello").await.unwrap();
        assert_eq!(reply, "echo:hello");
    }

    #[tokio::test]
    async fn test_error_payload_is_not_a_transport_failure() {
        let (requester, responder) = channel();
        tokio::spawn(async move { responder.run(&EchoHandler).await });

        let reply = requester.request("boom").await.unwrap();
        assert!(crate::message::is_error_reply(&reply));
        assert_eq!(reply, "ERROR:it broke");
    }

    #[tokio::test]
    async fn test_timeout_when_nobody_answers() {
        let store = Arc::new(MemoryStore::new());
        let requester = ControlRequester::new(store, LocalSignal::new());

        let err = requester
            .request_timeout("anyone there", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_late_reply_does_not_satisfy_a_later_wait() {
        let store = Arc::new(MemoryStore::new());
        let signal = LocalSignal::new();
        let requester = ControlRequester::new(store.clone(), signal.clone());
        let responder =
            ControlResponder::new(store.clone(), signal).with_poll_interval(Duration::from_millis(10));
        tokio::spawn(async move { responder.run(&EchoHandler).await });

        // First request times out while the handler is still working.
        let err = requester
            .request_timeout("slow", Duration::from_millis(80))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);

        // The late reply lands in the cell after the wait has given up.
        let mut stale = None;
        for _ in 0..100 {
            if let Some(raw) = store.get(REPLY_KEY) {
                stale = Some(raw);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stale.expect("late reply should land").ends_with("late:slow"));

        // A fresh request must get its own reply, never the stale one.
        let reply = requester.request("second").await.unwrap();
        assert_eq!(reply, "echo:second");
    }

    #[tokio::test]
    async fn test_polling_fallback_without_wake_signal() {
        let store = Arc::new(MemoryStore::new());
        let requester = ControlRequester::new(store.clone(), DeafSignal);
        let responder =
            ControlResponder::new(store, DeafSignal).with_poll_interval(Duration::from_millis(10));
        tokio::spawn(async move { responder.run(&EchoHandler).await });

        // Slower than the signaled path, still correct.
        let reply = requester.request("poll me").await.unwrap();
        assert_eq!(reply, "echo:poll me");
    }

    #[tokio::test]
    async fn test_malformed_request_cell_gets_error_reply() {
        let store = Arc::new(MemoryStore::new());
        let signal = LocalSignal::new();
        store.set(REQUEST_KEY, "garbage without a frame");

        let mut responder = ControlResponder::new(store.clone(), signal);
        responder.poll_once(&EchoHandler).await;

        let reply = ControlReply::decode(&store.get(REPLY_KEY).unwrap()).unwrap();
        assert!(crate::message::is_error_reply(&reply.payload));
        assert_eq!(store.get(REQUEST_KEY), None);
    }

    #[tokio::test]
    async fn test_duplicate_poll_does_not_reanswer() {
        let store = Arc::new(MemoryStore::new());
        let signal = LocalSignal::new();
        let mut responder = ControlResponder::new(store.clone(), signal);

        store.set(
            REQUEST_KEY,
            &ControlMessage {
                id: 9,
                command: "hello".into(),
            }
            .encode(),
        );
        responder.poll_once(&EchoHandler).await;
        let first = store.get(REPLY_KEY).unwrap();

        // Same request still in the cell; a second tick must not rewrite
        // the reply (a fresh reply could mask a concurrent overwrite).
        store.set(REPLY_KEY, "9|tampered");
        responder.poll_once(&EchoHandler).await;
        assert_eq!(store.get(REPLY_KEY).unwrap(), "9|tampered");
        assert_eq!(first, "9|echo:hello");
    }
}
