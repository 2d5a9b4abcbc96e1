//! Room and config-document errors.

/// Errors from room-code handling and config-document processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The code does not match `U/XXXX-XXXX-XXXX-XXXX` over the base-32
    /// alphabet.
    #[error("invalid room code: {0}")]
    InvalidCode(String),

    /// The configuration blob is too short or structurally unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
