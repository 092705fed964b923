//! Serialization and deserialization for the Ping wire protocol.
//!
//! Every frame exchanged with the relay is a single postcard-encoded value.
//! WebSocket binary frames already preserve message boundaries, so no length
//! prefix is added; instead decoding rejects frames with trailing bytes.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame is empty or carries bytes beyond the encoded value.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a value into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a value from a complete frame using postcard.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` for an empty frame or one with trailing
/// bytes, and `CodecError::Serialization` if the bytes do not describe a `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::InvalidFrame("empty frame".into()));
    }
    let (value, rest) = postcard::take_from_bytes::<T>(bytes)
        .map_err(|e| CodecError::Serialization(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CodecError::InvalidFrame(format!(
            "{} trailing bytes after value",
            rest.len()
        )));
    }
    Ok(value)
}
