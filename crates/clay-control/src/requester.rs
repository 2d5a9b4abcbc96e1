//! Requester side of the control channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::message::{ControlMessage, ControlReply, REPLY_KEY, REQUEST_KEY};
use crate::signal::WakeSignal;
use crate::store::SharedStore;

/// Reply-cell poll cadence while a request is outstanding.
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Default bound on a request/reply exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Sends commands to the background process and waits for the single
/// correlated reply.
///
/// At most one outstanding request per cell pair is supported; a second
/// request overwrites the first in the store (known race, see crate docs).
/// Correlation ids start from a random offset so two requester processes
/// sharing the cells do not collide in practice.
pub struct ControlRequester<S, W> {
    store: Arc<S>,
    signal: W,
    next_id: AtomicU64,
}

impl<S: SharedStore, W: WakeSignal> ControlRequester<S, W> {
    pub fn new(store: Arc<S>, signal: W) -> Self {
        Self {
            store,
            signal,
            next_id: AtomicU64::new(rand::thread_rng().r#gen::<u32>() as u64),
        }
    }

    /// Send a command and wait for its reply with the default timeout.
    pub async fn request(&self, command: &str) -> Result<String, TransportError> {
        self.request_timeout(command, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Send a command and wait for its reply.
    ///
    /// Returns the reply payload verbatim — `ERROR:`-prefixed payloads are
    /// command failures, not transport failures, and are left to the
    /// caller. On deadline the result is [`TransportError::Timeout`]; a
    /// reply arriving later is ignored by this and every future wait (the
    /// id can never match again).
    pub async fn request_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = ControlMessage {
            id,
            command: command.to_string(),
        };

        debug!(id, command, "control request");
        self.store.set(REQUEST_KEY, &message.encode());
        self.signal.raise();

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(raw) = self.store.get(REPLY_KEY) {
                // Stale or foreign replies stay in the cell; only our own
                // id terminates the wait.
                if let Ok(reply) = ControlReply::decode(&raw) {
                    if reply.id == id {
                        debug!(id, "control reply received");
                        return Ok(reply.payload);
                    }
                }
            }

            if Instant::now() >= deadline {
                debug!(id, "control request timed out");
                return Err(TransportError::Timeout);
            }
            tokio::time::sleep(REPLY_POLL_INTERVAL).await;
        }
    }
}
