//! Client error types.

use std::fmt;

use thiserror::Error;

/// Outcome error of a call attempt or a presence subscription.
///
/// Configuration errors are returned synchronously before anything is
/// connected; every other kind resolves a pending call exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// A required option is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The signaling connection could not be opened or failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The signaling connection closed before negotiation completed.
    #[error("signaling connection closed before the call was established (code {code}: {reason})")]
    TransportClosed { code: u16, reason: String },

    /// The negotiation engine rejected the offer or the remote answer.
    #[error("negotiation failed: {0}")]
    Negotiation(String),
}

impl CallError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a negotiation error.
    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation(message.into())
    }

    /// Returns the close code for [`CallError::TransportClosed`].
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::TransportClosed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for CLI operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the `alohartc` command-line front end.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Call or subscription failed.
    Call(CallError),
    /// Operation timed out.
    Timeout(String),
    /// Feature not compiled into this binary.
    Unsupported(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Call(err) => write!(f, "{}", err),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Call(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<CallError> for ClientError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Configuration(msg) => Self::Config(msg),
            other => Self::Call(other),
        }
    }
}
