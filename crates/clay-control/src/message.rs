//! Control message framing and command tags.
//!
//! Commands and replies are plain text by interop contract; the only
//! structure this transport adds is the `<id>|<text>` frame in the store
//! cells and the reserved `ERROR:` payload prefix.

use crate::error::TransportError;

/// Store cell the requester writes commands to.
pub const REQUEST_KEY: &str = "control.request";

/// Store cell the responder writes replies to.
pub const REPLY_KEY: &str = "control.reply";

/// Reserved payload prefix marking a failed command.
pub const ERROR_PREFIX: &str = "ERROR:";

/// `CREATE_ROOM:<name>` — create a room, reply with its code.
pub const CMD_CREATE_ROOM: &str = "CREATE_ROOM:";

/// `JOIN_ROOM:<code>` — join a room, reply `SUCCESS`.
pub const CMD_JOIN_ROOM: &str = "JOIN_ROOM:";

/// `runningInfo` — fetch the engine's running-info document.
pub const CMD_RUNNING_INFO: &str = "runningInfo";

/// A command written by the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub id: u64,
    pub command: String,
}

/// A reply written by the responder, correlated by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub id: u64,
    pub payload: String,
}

impl ControlMessage {
    pub fn encode(&self) -> String {
        format!("{}|{}", self.id, self.command)
    }

    pub fn decode(raw: &str) -> Result<Self, TransportError> {
        let (id, command) = split_frame(raw)?;
        Ok(Self {
            id,
            command: command.to_string(),
        })
    }
}

impl ControlReply {
    pub fn encode(&self) -> String {
        format!("{}|{}", self.id, self.payload)
    }

    pub fn decode(raw: &str) -> Result<Self, TransportError> {
        let (id, payload) = split_frame(raw)?;
        Ok(Self {
            id,
            payload: payload.to_string(),
        })
    }
}

fn split_frame(raw: &str) -> Result<(u64, &str), TransportError> {
    let (id, rest) = raw
        .split_once('|')
        .ok_or_else(|| TransportError::Protocol(format!("missing frame separator: {raw:?}")))?;
    let id = id
        .parse::<u64>()
        .map_err(|_| TransportError::Protocol(format!("bad correlation id: {raw:?}")))?;
    Ok((id, rest))
}

/// Format a failure payload.
pub fn error_reply(message: &str) -> String {
    format!("{ERROR_PREFIX}{message}")
}

/// Whether a payload denotes failure.
pub fn is_error_reply(payload: &str) -> bool {
    payload.starts_with(ERROR_PREFIX)
}
