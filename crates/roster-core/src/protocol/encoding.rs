//! Bincode encoding for session messages.
//!
//! The replicated field is plain text of arbitrary size, so decoding enforces
//! an upper bound before handing bytes to bincode.

use super::message::SessionMessage;
use thiserror::Error;

/// Maximum encoded message size (1MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Bytes an encoded message adds around the replicated text.
const MESSAGE_OVERHEAD: usize = 64;

/// Largest replicated value that still encodes within `MAX_MESSAGE_SIZE`.
pub const MAX_VALUE_SIZE: usize = MAX_MESSAGE_SIZE - MESSAGE_OVERHEAD;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Message too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Encode a message for the session transport.
pub fn encode(message: &SessionMessage) -> Result<Vec<u8>> {
    let bytes =
        bincode::serialize(message).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            limit: MAX_MESSAGE_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode a message received from the session transport.
pub fn decode(data: &[u8]) -> Result<SessionMessage> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge {
            size: data.len(),
            limit: MAX_MESSAGE_SIZE,
        });
    }
    bincode::deserialize(data).map_err(|e| CodecError::Deserialization(e.to_string()))
}
