//! Call negotiation driver.
//!
//! [`CallNegotiator::start_call`] validates options, then spawns one driver
//! task per call. The driver owns the transport and the engine, and runs
//! every input (transport events, engine events, control requests) through
//! the [`CallMachine`] in arrival order.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use alohartc_protocol::{decode, Signal};

use crate::engine::{
    EngineConfig, EngineEvent, EngineEvents, EngineFactory, NegotiationEngine, OfferConstraints,
    SessionDescription,
};
use crate::error::CallError;
use crate::machine::{Action, CallMachine, Input, NegotiationState};
use crate::options::CallOptions;
use crate::session::{CallControl, CancelHandle, Control, SessionHandle};
use crate::sink::CallEvent;
use crate::transport::{Connector, SignalTransport, TransportEvent, ABNORMAL_CLOSURE};

type Outcome = Result<SessionHandle, CallError>;

/// Starts calls.
#[derive(Clone)]
pub struct CallNegotiator {
    connector: Arc<dyn Connector>,
    engines: Arc<dyn EngineFactory>,
}

impl CallNegotiator {
    /// Creates a negotiator from its collaborators.
    pub fn new(connector: Arc<dyn Connector>, engines: Arc<dyn EngineFactory>) -> Self {
        Self { connector, engines }
    }

    /// Negotiator using the WebSocket transport and the WebRTC engine.
    #[cfg(feature = "webrtc")]
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(crate::websocket::WebSocketConnector::default()),
            Arc::new(crate::webrtc_engine::WebRtcEngineFactory::default()),
        )
    }

    /// Starts a call.
    ///
    /// Invalid options fail here, before anything is connected. Otherwise the
    /// returned [`PendingCall`] resolves exactly once. Must be called within
    /// a Tokio runtime.
    pub fn start_call(&self, options: CallOptions) -> Result<PendingCall, CallError> {
        options.validate()?;
        let url = options.endpoint()?;

        let call_id = Uuid::new_v4();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(NegotiationState::Connecting);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let control = CallControl::new(control_tx, state_rx);

        let span = info_span!("call", call_id = %call_id, device_id = %options.device_id);
        let driver = Driver {
            call_id,
            url,
            machine: CallMachine::new(&options),
            options,
            connector: Arc::clone(&self.connector),
            engines: Arc::clone(&self.engines),
            control: control.clone(),
            control_rx,
            state_tx,
            engine_tx,
            engine_rx,
            outcome: Some(outcome_tx),
            transport: None,
            engine: None,
        };
        tokio::spawn(driver.run().instrument(span));

        Ok(PendingCall {
            call_id,
            outcome: outcome_rx,
            control,
        })
    }
}

/// A call being negotiated; resolves to the established session.
pub struct PendingCall {
    call_id: Uuid,
    outcome: oneshot::Receiver<Outcome>,
    control: CallControl,
}

impl PendingCall {
    /// Log correlation id of this call.
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Latest negotiation state.
    pub fn state(&self) -> NegotiationState {
        self.control.state()
    }

    /// Gives up on the call; see [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.control.send(Control::Cancel);
    }

    /// A handle that can cancel the call after this future is moved.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.control.clone())
    }
}

impl Future for PendingCall {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(CallError::Transport(
                    "call driver stopped without an outcome".to_string(),
                ))
            })
        })
    }
}

struct Driver {
    call_id: Uuid,
    url: Url,
    options: CallOptions,
    machine: CallMachine,
    connector: Arc<dyn Connector>,
    engines: Arc<dyn EngineFactory>,
    control: CallControl,
    control_rx: mpsc::UnboundedReceiver<Control>,
    state_tx: watch::Sender<NegotiationState>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    outcome: Option<oneshot::Sender<Outcome>>,
    transport: Option<Box<dyn SignalTransport>>,
    engine: Option<Arc<dyn NegotiationEngine>>,
}

impl Driver {
    async fn run(mut self) {
        info!(url = %self.url, "connecting to signaling server");
        let connector = Arc::clone(&self.connector);
        let connected = tokio::select! {
            result = connector.connect(self.url.clone()) => result,
            Some(control) = self.control_rx.recv() => {
                self.dispatch(Input::from(control)).await;
                return;
            }
        };

        let mut events = match connected {
            Ok((transport, events)) => {
                self.transport = Some(transport);
                self.dispatch(Input::Opened).await;
                events
            }
            Err(e) => {
                self.dispatch(Input::ConnectFailed(e.to_string())).await;
                return;
            }
        };

        while !self.machine.is_finished() {
            let input = tokio::select! {
                Some(control) = self.control_rx.recv() => Input::from(control),
                event = events.recv() => self.transport_input(event),
                Some(event) = self.engine_rx.recv() => Input::Engine(event),
            };
            self.dispatch(input).await;
        }
        debug!(state = %self.machine.state(), "call driver finished");
    }

    fn transport_input(&mut self, event: Option<TransportEvent>) -> Input {
        match event {
            Some(TransportEvent::Message(text)) => {
                let message = decode(&text);
                self.options.sink.record(&CallEvent::FrameReceived {
                    kind: message.kind.clone(),
                    bytes: message.body.len(),
                });
                Input::Frame(message)
            }
            Some(TransportEvent::Error(error)) => Input::TransportError(error),
            Some(TransportEvent::Closed { code, reason }) => {
                self.transport = None;
                Input::TransportClosed { code, reason }
            }
            None => {
                self.transport = None;
                Input::TransportClosed {
                    code: ABNORMAL_CLOSURE,
                    reason: "transport event stream ended".to_string(),
                }
            }
        }
    }

    /// Runs an input and every completion it causes through the machine.
    async fn dispatch(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            let actions = self.machine.handle(input);
            self.state_tx.send_replace(self.machine.state());
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Input> {
        match action {
            Action::Send(signal) => self.send(signal).await,
            Action::BuildEngine(config) => Some(self.build_engine(config).await),
            Action::CreateOffer(constraints) => Some(self.create_offer(constraints).await),
            Action::ApplyAnswer(sdp) => {
                let engine = self.engine.clone()?;
                Some(
                    match engine
                        .set_remote_description(SessionDescription::answer(sdp))
                        .await
                    {
                        Ok(()) => Input::AnswerApplied,
                        Err(e) => Input::AnswerRejected(e.to_string()),
                    },
                )
            }
            Action::ApplyCandidate(candidate) => {
                let engine = self.engine.clone()?;
                engine
                    .add_candidate(candidate)
                    .await
                    .err()
                    .map(|e| Input::CandidateRejected(e.to_string()))
            }
            Action::AttachStream(stream) => {
                info!(stream = %stream.id(), "remote stream attached");
                self.options.remote_video_sink.attach(stream);
                None
            }
            Action::Resolve => self.resolve().await,
            Action::Reject(error) => {
                if let Some(outcome) = self.outcome.take() {
                    let _ = outcome.send(Err(error));
                }
                None
            }
            Action::CloseTransport => {
                if let Some(transport) = self.transport.take() {
                    if let Err(e) = transport.close().await {
                        debug!(error = %e, "closing signaling transport");
                    }
                }
                None
            }
            Action::ReleaseEngine => {
                self.release_engine().await;
                None
            }
        }
    }

    async fn send(&mut self, signal: Signal) -> Option<Input> {
        let Some(transport) = self.transport.as_ref() else {
            debug!(kind = %signal.kind(), "transport closed, frame not sent");
            return None;
        };
        let text = match signal.encode() {
            Ok(text) => text,
            Err(e) => {
                self.options.sink.record(&CallEvent::Warning(format!(
                    "failed to encode {} frame: {}",
                    signal.kind(),
                    e
                )));
                return None;
            }
        };
        let bytes = text.len() - signal.kind().len() - 1;
        self.options.sink.record(&CallEvent::FrameSent {
            kind: signal.kind().to_string(),
            bytes,
        });
        transport
            .send(text)
            .await
            .err()
            .map(|e| Input::TransportError(e.to_string()))
    }

    async fn build_engine(&mut self, config: EngineConfig) -> Input {
        debug!(servers = config.ice_servers.len(), "building peer connection");
        let events = EngineEvents::new(self.engine_tx.clone());
        match self.engines.build(config, events).await {
            Ok(engine) => {
                self.engine = Some(engine);
                Input::EngineReady
            }
            Err(e) => Input::EngineFailed(e.to_string()),
        }
    }

    async fn create_offer(&mut self, constraints: OfferConstraints) -> Input {
        let Some(engine) = self.engine.clone() else {
            return Input::OfferFailed("no peer connection".to_string());
        };
        let offer = match engine.create_offer(constraints).await {
            Ok(offer) => offer,
            Err(e) => return Input::OfferFailed(e.to_string()),
        };
        let sdp = offer.sdp.clone();
        match engine.set_local_description(offer).await {
            Ok(()) => Input::OfferReady(sdp),
            Err(e) => Input::OfferFailed(e.to_string()),
        }
    }

    async fn release_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.close().await {
                warn!(error = %e, "closing peer connection");
            }
        }
    }

    /// Hands the session to the caller. If nobody is waiting any more, the
    /// session is torn down here instead.
    async fn resolve(&mut self) -> Option<Input> {
        let outcome = self.outcome.take()?;
        let result = match self.engine.clone() {
            Some(engine) => Ok(SessionHandle::new(
                self.call_id,
                self.options.device_id.clone(),
                engine,
                self.control.clone(),
            )),
            None => Err(CallError::negotiation("established without a peer connection")),
        };
        info!("call established");
        match outcome.send(result) {
            Ok(()) => None,
            Err(Ok(session)) => {
                info!("caller dropped the pending call, closing the session");
                session.disarm();
                self.release_engine().await;
                Some(Input::SessionClosed)
            }
            Err(Err(_)) => {
                debug!("caller dropped the pending call");
                None
            }
        }
    }
}
