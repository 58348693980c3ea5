//! Peer-connection engine abstraction.
//!
//! The negotiator drives a [`NegotiationEngine`] through the offer/answer
//! exchange but never touches media itself. Engine-originated events (local
//! candidates, remote tracks, connection state) are pushed back through
//! [`EngineEvents`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use alohartc_protocol::{CandidateSignal, IceServer};

use crate::transport::BoxFuture;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error reported by the negotiation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct EngineError {
    /// Engine operation that failed.
    pub operation: &'static str,
    /// Engine-provided detail.
    pub message: String,
}

impl EngineError {
    /// Creates an engine error.
    pub fn new(operation: &'static str, message: impl ToString) -> Self {
        Self {
            operation,
            message: message.to_string(),
        }
    }
}

/// Which side produced a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Creates an offer description.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Creates an answer description.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Media the local side wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferConstraints {
    pub receive_audio: bool,
    pub receive_video: bool,
}

impl OfferConstraints {
    /// Receive video only; the client never sends media.
    pub fn receive_video_only() -> Self {
        Self {
            receive_audio: false,
            receive_video: true,
        }
    }
}

/// Which ICE candidates the engine may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Host, reflexive and relay candidates.
    #[default]
    All,
    /// Relay candidates only.
    Relay,
}

/// Configuration the engine is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
}

/// A remote media stream announced by the engine.
///
/// The handle is engine-specific (e.g. a remote track); consumers that know
/// the engine downcast it with [`RemoteStream::downcast`].
#[derive(Clone)]
pub struct RemoteStream {
    id: String,
    handle: Arc<dyn Any + Send + Sync>,
}

impl RemoteStream {
    /// Wraps an engine stream handle.
    pub fn new<T: Any + Send + Sync>(id: impl Into<String>, handle: Arc<T>) -> Self {
        Self {
            id: id.into(),
            handle,
        }
    }

    /// Stream identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the engine handle if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.handle).downcast::<T>().ok()
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Receives the remote stream of an established call.
pub trait RemoteMediaSink: Send + Sync {
    /// Called once per distinct remote stream.
    fn attach(&self, stream: RemoteStream);
}

impl<F> RemoteMediaSink for F
where
    F: Fn(RemoteStream) + Send + Sync,
{
    fn attach(&self, stream: RemoteStream) {
        self(stream)
    }
}

/// Notification raised by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A local candidate was gathered, or gathering finished.
    LocalCandidate(CandidateSignal),
    /// A remote track arrived.
    Track(RemoteStream),
    /// Peer connection state, as the engine names it.
    ConnectionState(String),
}

/// Channel the engine reports its events on.
///
/// Sending never blocks; events raised after the call is gone are dropped.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Reports a local candidate or the end of gathering.
    pub fn local_candidate(&self, candidate: CandidateSignal) {
        self.emit(EngineEvent::LocalCandidate(candidate));
    }

    /// Reports a remote stream.
    pub fn track(&self, stream: RemoteStream) {
        self.emit(EngineEvent::Track(stream));
    }

    /// Reports a connection state change.
    pub fn connection_state(&self, state: impl Into<String>) {
        self.emit(EngineEvent::ConnectionState(state.into()));
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// A live peer connection used for negotiation.
pub trait NegotiationEngine: Send + Sync {
    /// Creates a local offer.
    fn create_offer(
        &self,
        constraints: OfferConstraints,
    ) -> BoxFuture<'_, EngineResult<SessionDescription>>;

    /// Applies a local description.
    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, EngineResult<()>>;

    /// Applies the remote description.
    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, EngineResult<()>>;

    /// Adds a remote candidate, or signals the remote end of candidates.
    fn add_candidate(&self, candidate: CandidateSignal) -> BoxFuture<'_, EngineResult<()>>;

    /// Closes the peer connection and releases its resources.
    fn close(&self) -> BoxFuture<'_, EngineResult<()>>;

    /// The concrete engine, for callers that need engine-specific access.
    fn as_any(&self) -> &dyn Any;
}

/// Builds peer connections.
pub trait EngineFactory: Send + Sync {
    /// Creates an engine; events are reported through `events`.
    fn build(
        &self,
        config: EngineConfig,
        events: EngineEvents,
    ) -> BoxFuture<'_, EngineResult<Arc<dyn NegotiationEngine>>>;
}
