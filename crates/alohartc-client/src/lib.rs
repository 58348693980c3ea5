//! WebRTC signaling client for alohacam devices.
//!
//! [`CallNegotiator`] places a call: it opens the signaling WebSocket,
//! authenticates, obtains ICE servers, exchanges the offer and answer, and
//! trickles candidates. [`PresenceMonitor`] subscribes to device status
//! changes. The `alohartc` binary wraps both.

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod machine;
pub mod negotiator;
pub mod options;
pub mod presence;
pub mod secret;
pub mod session;
pub mod sink;
pub mod transport;
#[cfg(feature = "webrtc")]
pub mod webrtc_engine;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use engine::{
    EngineConfig, EngineError, EngineEvents, EngineFactory, IceTransportPolicy, NegotiationEngine,
    OfferConstraints, RemoteMediaSink, RemoteStream, SessionDescription,
};
pub use error::{CallError, ClientError, ClientResult};
pub use machine::NegotiationState;
pub use negotiator::{CallNegotiator, PendingCall};
pub use options::{CallOptions, MonitorOptions, MonitorTarget, DEFAULT_SIGNAL_SERVER};
pub use presence::{PresenceMonitor, Subscription, SubscriptionEnd};
pub use session::{CancelHandle, SessionHandle};
pub use sink::{CallEvent, EventSink, MemorySink, TracingSink};
pub use transport::{Connector, SignalTransport, TransportError, TransportEvent};
pub use websocket::WebSocketConnector;
