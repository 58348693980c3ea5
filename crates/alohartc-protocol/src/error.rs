//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while interpreting a frame body.
///
/// Framing itself never fails; these only arise when the body of a known
/// message kind does not hold the payload that kind requires.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Body of a recognized kind could not be decoded.
    #[error("invalid {kind} body: {source}")]
    InvalidBody {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize an outbound payload to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates an invalid body error for the given message kind.
    pub fn invalid_body(kind: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidBody {
            kind: kind.into(),
            source,
        }
    }

    /// Returns the message kind whose body was rejected, if any.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::InvalidBody { kind, .. } => Some(kind),
            Self::Serialization(_) => None,
        }
    }
}
