//! Tunnel controller errors.

use clay_engine::EngineError;
use clay_room::RoomError;

/// Errors surfaced by the tunnel session controller.
///
/// One error per attempt: the controller never retries on its own, and
/// `stop` failures are logged rather than surfaced (OS-level teardown must
/// complete regardless of native cleanup).
#[derive(Debug, Clone, thiserror::Error)]
pub enum TunnelError {
    /// `start` was called while the session is not `Idle`.
    #[error("tunnel already running")]
    AlreadyRunning,

    /// Missing or unusable configuration; fatal to the start attempt.
    #[error("configuration error: {0}")]
    Config(String),

    /// The native engine rejected an operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The OS rejected the interface settings, or the tunnel descriptor
    /// could not be handed to the engine afterwards.
    #[error("settings apply failed: {0}")]
    SettingsApply(String),

    /// The controller task has terminated.
    #[error("tunnel controller is gone")]
    ControllerGone,
}

impl From<RoomError> for TunnelError {
    fn from(e: RoomError) -> Self {
        TunnelError::Config(e.to_string())
    }
}
