//! Call diagnostics.
//!
//! Every state transition, frame, connection-state change and warning is
//! reported to an [`EventSink`]. The default [`TracingSink`] forwards to
//! `tracing`; [`MemorySink`] keeps events for inspection.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::machine::NegotiationState;

/// One diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// The negotiation state changed.
    StateChanged {
        from: NegotiationState,
        to: NegotiationState,
    },
    /// A frame was written. Bodies are not recorded since they may hold
    /// credentials.
    FrameSent { kind: String, bytes: usize },
    /// A frame was received.
    FrameReceived { kind: String, bytes: usize },
    /// The engine reported a connection state.
    ConnectionState(String),
    /// The transport reported an error.
    TransportError(String),
    /// The transport closed.
    TransportClosed { code: u16, reason: String },
    /// Informational note.
    Note(String),
    /// Something was ignored or went wrong without failing the call.
    Warning(String),
}

/// Receives call diagnostics.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &CallEvent);
}

impl<F> EventSink for F
where
    F: Fn(&CallEvent) + Send + Sync,
{
    fn record(&self, event: &CallEvent) {
        self(event)
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &CallEvent) {
        match event {
            CallEvent::StateChanged { from, to } => {
                info!(from = %from, to = %to, "negotiation state changed")
            }
            CallEvent::FrameSent { kind, bytes } => debug!(kind = %kind, bytes, "frame sent"),
            CallEvent::FrameReceived { kind, bytes } => {
                debug!(kind = %kind, bytes, "frame received")
            }
            CallEvent::ConnectionState(state) => info!(state = %state, "peer connection state"),
            CallEvent::TransportError(error) => warn!(error = %error, "signaling transport error"),
            CallEvent::TransportClosed { code, reason } => {
                info!(code, reason = %reason, "signaling connection closed")
            }
            CallEvent::Note(message) => debug!("{}", message),
            CallEvent::Warning(message) => warn!("{}", message),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CallEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<CallEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded state transitions as `(from, to)` pairs.
    pub fn transitions(&self) -> Vec<(NegotiationState, NegotiationState)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::StateChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    /// Recorded warnings.
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &CallEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
