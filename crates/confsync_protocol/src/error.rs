//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON or did not match the message shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The message carried a `type` tag this side does not understand.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A message could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Creates a malformed-message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Maps a serde_json decode error, separating unknown tags from shape errors.
    pub(crate) fn from_decode(err: serde_json::Error) -> Self {
        let text = err.to_string();
        match text.strip_prefix("unknown variant `") {
            Some(rest) => {
                let tag = rest.split('`').next().unwrap_or_default();
                Self::UnknownType(tag.to_string())
            }
            None => Self::Malformed(text),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_decode(err)
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
