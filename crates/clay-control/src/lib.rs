//! Clay Control Channel
//!
//! Request/response between the foreground application and the background
//! tunnel process, built from the only two primitives the platform offers
//! across that boundary: a shared persistent key-value store and a one-way
//! wake signal. There is no socket and no pipe.
//!
//! # Protocol
//!
//! 1. The requester writes `<id>|<command>` to the request cell and raises
//!    the wake signal.
//! 2. The responder (woken, or on its polling tick) re-reads the request
//!    cell, dispatches the command, and writes `<id>|<payload>` to the
//!    reply cell.
//! 3. The requester polls the reply cell until it sees its own id or a
//!    deadline expires.
//!
//! The store cells are last-writer-wins, never a queue: a second request
//! can overwrite a first before it is consumed. The correlation id makes
//! that race detectable — the overwritten requester times out instead of
//! consuming a stranger's reply, and a reply arriving after the deadline
//! can never satisfy a later wait. The wake signal is a latency
//! optimization only; a responder running on its polling tick alone is
//! correct, just slower.

mod error;
mod message;
mod requester;
mod responder;
mod signal;
mod store;

pub use error::TransportError;
pub use message::{
    CMD_CREATE_ROOM, CMD_JOIN_ROOM, CMD_RUNNING_INFO, ControlMessage, ControlReply, ERROR_PREFIX,
    REPLY_KEY, REQUEST_KEY, error_reply, is_error_reply,
};
pub use requester::ControlRequester;
pub use responder::{ControlHandler, ControlResponder};
pub use signal::{LocalSignal, WakeSignal};
pub use store::{JsonFileStore, MemoryStore, SharedStore};
