//! Numeric status codes carried in [`ExitCode::status`](crate::types::ExitCode).
//!
//! | Code | Meaning                 |
//! |------|-------------------------|
//! | 0    | success                 |
//! | 1    | recipient not connected |
//! | 2    | recipient queue full    |
//! | 3    | invalid request         |
//! | 4    | transport error         |
//! | 5    | internal relay error    |
//!
//! `1` and `2` are retryable by the caller; `3` is not.

use serde::{Deserialize, Serialize};

/// Failure category reported to relay callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum StatusCode {
    /// Request accepted.
    Ok = 0,
    /// The addressed client has no open `ReceiveMessages` stream.
    RecipientNotConnected = 1,
    /// The recipient's queue stayed full for the whole enqueue wait.
    QueueFull = 2,
    /// Malformed or empty identifiers, oversized payloads, failed validation.
    InvalidRequest = 3,
    /// Writing to an established stream failed.
    TransportError = 4,
    /// Unexpected relay-side failure (e.g. a frame could not be encoded).
    Internal = 5,
}

impl StatusCode {
    /// Returns the numeric wire value.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Maps a wire value back to a status code, if known.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::RecipientNotConnected),
            2 => Some(Self::QueueFull),
            3 => Some(Self::InvalidRequest),
            4 => Some(Self::TransportError),
            5 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RecipientNotConnected | Self::QueueFull)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::RecipientNotConnected => "recipient not connected",
            Self::QueueFull => "queue full",
            Self::InvalidRequest => "invalid request",
            Self::TransportError => "transport error",
            Self::Internal => "internal error",
        };
        f.write_str(text)
    }
}
