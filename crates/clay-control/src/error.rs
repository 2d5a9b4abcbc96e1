//! Transport errors.

/// Errors from the control-channel transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No correlated reply arrived before the deadline. Resending is the
    /// caller's decision; the transport never retries.
    #[error("control request timed out")]
    Timeout,

    /// A store cell held text that does not frame as `<id>|<text>`.
    #[error("control protocol error: {0}")]
    Protocol(String),
}
