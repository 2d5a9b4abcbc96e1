//! Engine error type.

/// Errors surfaced by the native engine binding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The engine returned a failure status with a message.
    #[error("engine error: {0}")]
    Native(String),

    /// The engine returned a failure status without a message.
    #[error("engine error (no detail available)")]
    Unknown,

    /// Input could not cross the C boundary (embedded NUL byte).
    #[error("invalid engine input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Build from an optional callee-provided message.
    pub fn from_native(msg: Option<String>) -> Self {
        match msg {
            Some(m) => EngineError::Native(m),
            None => EngineError::Unknown,
        }
    }
}
