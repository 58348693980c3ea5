//! Handles returned to callers of a call attempt.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::NegotiationEngine;
use crate::error::CallError;
use crate::machine::{Input, NegotiationState};

/// Request from a handle to the call's driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Cancel,
    SessionClosed,
}

impl From<Control> for Input {
    fn from(control: Control) -> Self {
        match control {
            Control::Cancel => Input::Cancel,
            Control::SessionClosed => Input::SessionClosed,
        }
    }
}

/// Shared link to a running driver: control requests in, state out.
#[derive(Debug, Clone)]
pub(crate) struct CallControl {
    tx: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<NegotiationState>,
}

impl CallControl {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Control>,
        state: watch::Receiver<NegotiationState>,
    ) -> Self {
        Self { tx, state }
    }

    /// Sends a request; a driver that already exited ignores it.
    pub(crate) fn send(&self, control: Control) {
        if self.tx.send(control).is_err() {
            debug!(?control, "call driver already stopped");
        }
    }

    pub(crate) fn state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    pub(crate) async fn finished(&mut self) -> NegotiationState {
        let waited = self.state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        match waited {
            Ok(state) => state,
            // Driver dropped its sender, so it has stopped.
            Err(_) => *self.state.borrow(),
        }
    }
}

/// Cancels a call that has not been established yet.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    control: CallControl,
}

impl CancelHandle {
    pub(crate) fn new(control: CallControl) -> Self {
        Self { control }
    }

    /// Closes the signaling transport. Before establishment the pending call
    /// rejects with `TransportClosed { code: 1000 }`; afterwards this does
    /// nothing.
    pub fn cancel(&self) {
        self.control.send(Control::Cancel);
    }

    /// Latest negotiation state.
    pub fn state(&self) -> NegotiationState {
        self.control.state()
    }
}

/// An established call.
///
/// Holds the negotiated peer connection and a link to the signaling driver,
/// which keeps trickling candidates until the transport closes. Dropping the
/// handle without [`SessionHandle::close`] still closes both.
pub struct SessionHandle {
    call_id: Uuid,
    device_id: String,
    engine: Arc<dyn NegotiationEngine>,
    control: CallControl,
    closed: bool,
}

impl SessionHandle {
    pub(crate) fn new(
        call_id: Uuid,
        device_id: String,
        engine: Arc<dyn NegotiationEngine>,
        control: CallControl,
    ) -> Self {
        Self {
            call_id,
            device_id,
            engine,
            control,
            closed: false,
        }
    }

    /// Drops the handle without touching the engine or the driver; the
    /// caller has already released both.
    pub(crate) fn disarm(mut self) {
        self.closed = true;
    }

    /// Log correlation id of this call.
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Called device.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The negotiated connection.
    pub fn engine(&self) -> &Arc<dyn NegotiationEngine> {
        &self.engine
    }

    /// Latest negotiation state; `Closed` once signaling is gone.
    pub fn state(&self) -> NegotiationState {
        self.control.state()
    }

    /// Waits until the signaling connection is gone.
    pub async fn signaling_closed(&mut self) -> NegotiationState {
        self.control.finished().await
    }

    /// Closes the peer connection and the signaling transport.
    pub async fn close(mut self) -> Result<(), CallError> {
        let result = self.engine.close().await;
        self.control.send(Control::SessionClosed);
        self.closed = true;
        result.map_err(|e| CallError::negotiation(e.to_string()))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.control.send(Control::SessionClosed);
        let engine = Arc::clone(&self.engine);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = engine.close().await {
                        warn!(error = %e, "closing dropped session");
                    }
                });
            }
            Err(_) => warn!("session dropped outside a runtime, peer connection left open"),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("call_id", &self.call_id)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
