//! Signaling transport abstraction.
//!
//! The negotiator only needs a message-oriented connection: open it, send
//! text, observe inbound text, errors and the close. [`Connector`] opens
//! connections; each open connection is a [`SignalTransport`] for outbound
//! traffic plus a channel of [`TransportEvent`]s for everything inbound.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the collaborator traits object-safe so that the
/// negotiator can hold them as `Arc<dyn ...>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code used for a client-initiated close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be opened.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The connection is already closed.
    #[error("connection is closed")]
    Closed,
}

impl TransportError {
    /// Creates a connect error.
    pub fn connect(url: &Url, reason: impl ToString) -> Self {
        Self::Connect {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Inbound notification from an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text message.
    Message(String),
    /// A transport-level error; a `Closed` event normally follows.
    Error(String),
    /// The connection is gone. Always the last event.
    Closed { code: u16, reason: String },
}

/// Outbound half of an open connection.
pub trait SignalTransport: Send + Sync {
    /// Sends one text message.
    fn send(&self, text: String) -> BoxFuture<'_, TransportResult<()>>;

    /// Closes the connection. Closing twice is not an error.
    fn close(&self) -> BoxFuture<'_, TransportResult<()>>;
}

/// An open connection: the outbound half and the inbound event stream.
pub type Connection = (Box<dyn SignalTransport>, mpsc::Receiver<TransportEvent>);

/// Opens signaling connections.
pub trait Connector: Send + Sync {
    /// Connects to `url`. Resolving successfully is the "open" event.
    fn connect(&self, url: Url) -> BoxFuture<'_, TransportResult<Connection>>;
}
