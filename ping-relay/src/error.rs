//! Relay error taxonomy and its mapping onto wire status codes.

use ping_proto::status::StatusCode;
use ping_proto::types::ExitCode;

/// Errors reported by relay operations to their immediate caller.
///
/// None of these are fatal to the process; each affects only the request or
/// connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The recipient has no open `ReceiveMessages` stream.
    #[error("recipient {recipient} not connected")]
    RecipientNotConnected {
        /// The addressed client.
        recipient: String,
    },

    /// The recipient's queue stayed full for the whole enqueue wait.
    #[error("queue for {recipient} is full (capacity {capacity}), retry later")]
    QueueFull {
        /// The addressed client.
        recipient: String,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Empty identifiers, oversized payloads, failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Writing to an established stream failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the wire status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::RecipientNotConnected { .. } => StatusCode::RecipientNotConnected,
            Self::QueueFull { .. } => StatusCode::QueueFull,
            Self::InvalidRequest(_) => StatusCode::InvalidRequest,
            Self::Transport(_) => StatusCode::TransportError,
            Self::Internal(_) => StatusCode::Internal,
        }
    }

    /// Converts the error into the `ExitCode` returned to RPC callers.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::new(self.status(), self.to_string())
    }
}
