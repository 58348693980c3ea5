//! Call negotiation state machine.
//!
//! [`CallMachine`] holds every negotiation decision and performs no IO: the
//! driver feeds it one [`Input`] at a time and executes the returned
//! [`Action`]s in order. Engine operations complete asynchronously and come
//! back as inputs (`EngineReady`, `OfferReady`, `AnswerApplied`, ...).
//!
//! ```text
//! Connecting ──open──▶ AwaitingCredentials ──turn──▶ Negotiating ──answer──▶ Established
//!      │        └──(ice servers supplied)──────────────▲                         │
//!      └─────────────── close / failure ──▶ Failed            transport close ──▶ Closed
//! ```

use std::fmt;
use std::sync::Arc;

use alohartc_protocol::{CandidateSignal, IceServer, Signal, WireMessage, TURN};

use crate::engine::{EngineConfig, EngineEvent, IceTransportPolicy, OfferConstraints, RemoteStream};
use crate::error::CallError;
use crate::options::CallOptions;
use crate::sink::{CallEvent, EventSink};
use crate::transport::NORMAL_CLOSURE;

/// Negotiation progress of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// Opening the signaling connection.
    Connecting,
    /// Waiting for relay credentials from the server.
    AwaitingCredentials,
    /// Offer/answer and candidate exchange in progress.
    Negotiating,
    /// Remote answer applied; the call is up.
    Established,
    /// Torn down after being established.
    Closed,
    /// Gave up before being established.
    Failed,
}

impl NegotiationState {
    /// Returns `true` for `Closed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::AwaitingCredentials => "awaiting-credentials",
            Self::Negotiating => "negotiating",
            Self::Established => "established",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something that happened to the call.
#[derive(Debug)]
pub enum Input {
    /// The signaling connection is open.
    Opened,
    /// The signaling connection could not be opened.
    ConnectFailed(String),
    /// An inbound frame.
    Frame(WireMessage),
    /// The transport reported an error.
    TransportError(String),
    /// The transport closed.
    TransportClosed { code: u16, reason: String },
    /// The engine raised an event.
    Engine(EngineEvent),
    /// The engine was built.
    EngineReady,
    /// The engine could not be built.
    EngineFailed(String),
    /// The local offer was created and applied.
    OfferReady(String),
    /// Offer creation failed.
    OfferFailed(String),
    /// The remote answer was applied.
    AnswerApplied,
    /// The engine rejected the remote answer.
    AnswerRejected(String),
    /// The engine rejected a remote candidate.
    CandidateRejected(String),
    /// The caller gave up before the call was established.
    Cancel,
    /// The caller closed the established session.
    SessionClosed,
}

/// Something the driver must do.
#[derive(Debug)]
pub enum Action {
    /// Write a frame.
    Send(Signal),
    /// Build the engine, then report `EngineReady` or `EngineFailed`.
    BuildEngine(EngineConfig),
    /// Create and apply the local offer, then report `OfferReady` or
    /// `OfferFailed`.
    CreateOffer(OfferConstraints),
    /// Apply the remote answer, then report `AnswerApplied` or
    /// `AnswerRejected`.
    ApplyAnswer(String),
    /// Add a remote candidate; failures come back as `CandidateRejected`.
    ApplyCandidate(CandidateSignal),
    /// Hand a remote stream to the caller's media sink.
    AttachStream(RemoteStream),
    /// Resolve the pending call with a session handle.
    Resolve,
    /// Reject the pending call.
    Reject(CallError),
    /// Close the signaling transport.
    CloseTransport,
    /// Close the engine, if one was built.
    ReleaseEngine,
}

/// Sans-IO negotiation state for one call.
pub struct CallMachine {
    state: NegotiationState,
    auth_token: String,
    ice_servers: Option<Vec<IceServer>>,
    policy: IceTransportPolicy,
    sink: Arc<dyn EventSink>,
    engine_ready: bool,
    offer_sent: bool,
    answer_received: bool,
    attached_stream: Option<String>,
}

impl CallMachine {
    /// Creates a machine in `Connecting`.
    pub fn new(options: &CallOptions) -> Self {
        Self {
            state: NegotiationState::Connecting,
            auth_token: options.auth_token.clone(),
            ice_servers: options.ice_servers.clone(),
            policy: options.ice_transport_policy,
            sink: Arc::clone(&options.sink),
            engine_ready: false,
            offer_sent: false,
            answer_received: false,
            attached_stream: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Returns `true` once nothing more will happen.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Consumes one input and returns the actions to perform, in order.
    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        if self.state.is_terminal() {
            self.note(format!("ignoring {} after the call ended", input_name(&input)));
            return Vec::new();
        }

        match input {
            Input::Opened => self.on_opened(),
            Input::ConnectFailed(reason) => self.fail(CallError::Transport(reason)),
            Input::Frame(message) => self.on_frame(message),
            Input::TransportError(error) => {
                self.sink.record(&CallEvent::TransportError(error));
                Vec::new()
            }
            Input::TransportClosed { code, reason } => self.on_transport_closed(code, reason),
            Input::Engine(event) => self.on_engine_event(event),
            Input::EngineReady => {
                self.engine_ready = true;
                vec![Action::CreateOffer(OfferConstraints::receive_video_only())]
            }
            Input::EngineFailed(error) => self.fail(CallError::negotiation(format!(
                "failed to create peer connection: {}",
                error
            ))),
            Input::OfferReady(sdp) => {
                self.offer_sent = true;
                vec![Action::Send(Signal::SdpOffer(sdp))]
            }
            Input::OfferFailed(error) => {
                self.fail(CallError::negotiation(format!("failed to create offer: {}", error)))
            }
            Input::AnswerApplied => {
                self.transition(NegotiationState::Established);
                vec![Action::Resolve]
            }
            Input::AnswerRejected(error) => self.fail(CallError::negotiation(format!(
                "failed to apply remote answer: {}",
                error
            ))),
            Input::CandidateRejected(error) => {
                self.warn(format!("remote candidate rejected: {}", error));
                Vec::new()
            }
            Input::Cancel => {
                if self.state == NegotiationState::Established {
                    self.note("cancel after establishment ignored".to_string());
                    return Vec::new();
                }
                self.fail(CallError::TransportClosed {
                    code: NORMAL_CLOSURE,
                    reason: "cancelled".to_string(),
                })
            }
            Input::SessionClosed => {
                self.transition(NegotiationState::Closed);
                vec![Action::CloseTransport]
            }
        }
    }

    fn on_opened(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::Send(Signal::AuthToken(self.auth_token.clone()))];
        match self.ice_servers.take() {
            Some(servers) => {
                self.transition(NegotiationState::Negotiating);
                actions.push(Action::BuildEngine(self.engine_config(servers)));
            }
            None => {
                self.transition(NegotiationState::AwaitingCredentials);
                actions.push(Action::Send(Signal::RequestTurn));
            }
        }
        actions
    }

    fn on_frame(&mut self, message: WireMessage) -> Vec<Action> {
        let kind = message.kind.clone();
        match Signal::from_message(message) {
            Ok(signal) => self.on_signal(signal),
            Err(e) if kind == TURN && self.state == NegotiationState::AwaitingCredentials => {
                self.fail(CallError::negotiation(format!("invalid relay credentials: {}", e)))
            }
            Err(e) => {
                self.warn(format!("ignoring malformed {} frame: {}", kind, e));
                Vec::new()
            }
        }
    }

    fn on_signal(&mut self, signal: Signal) -> Vec<Action> {
        match signal {
            Signal::Turn(server) => {
                if self.state != NegotiationState::AwaitingCredentials {
                    self.note("ignoring repeated turn frame".to_string());
                    return Vec::new();
                }
                self.transition(NegotiationState::Negotiating);
                vec![Action::BuildEngine(self.engine_config(vec![server]))]
            }
            Signal::SdpAnswer(sdp) => {
                if !self.offer_sent {
                    self.warn("ignoring sdp-answer received before the offer was sent".to_string());
                    Vec::new()
                } else if self.answer_received {
                    self.note("ignoring duplicate sdp-answer".to_string());
                    Vec::new()
                } else {
                    self.answer_received = true;
                    vec![Action::ApplyAnswer(sdp)]
                }
            }
            Signal::IceCandidate {
                candidate,
                ignored_lines,
            } => {
                for line in ignored_lines {
                    self.warn(format!("ignoring unrecognized ice-candidate line: {}", line));
                }
                if !self.engine_ready {
                    self.warn(
                        "dropping remote candidate received before the peer connection exists"
                            .to_string(),
                    );
                    return Vec::new();
                }
                if candidate.is_end() {
                    self.note("remote end of candidates".to_string());
                }
                // Not buffered until the answer is applied; a candidate that
                // beats the answer reaches the engine first.
                vec![Action::ApplyCandidate(candidate)]
            }
            other => {
                self.warn(format!("ignoring unexpected {} frame", other.kind()));
                Vec::new()
            }
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) -> Vec<Action> {
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                if candidate.is_end() {
                    self.note("local candidate gathering complete".to_string());
                }
                vec![Action::Send(Signal::ice_candidate(candidate))]
            }
            EngineEvent::Track(stream) => {
                if self.attached_stream.as_deref() == Some(stream.id()) {
                    self.note(format!("stream {} already attached", stream.id()));
                    return Vec::new();
                }
                self.attached_stream = Some(stream.id().to_string());
                vec![Action::AttachStream(stream)]
            }
            EngineEvent::ConnectionState(state) => {
                self.sink.record(&CallEvent::ConnectionState(state));
                Vec::new()
            }
        }
    }

    fn on_transport_closed(&mut self, code: u16, reason: String) -> Vec<Action> {
        self.sink.record(&CallEvent::TransportClosed {
            code,
            reason: reason.clone(),
        });
        if self.state == NegotiationState::Established {
            self.transition(NegotiationState::Closed);
            return Vec::new();
        }
        self.fail(CallError::TransportClosed { code, reason })
    }

    fn fail(&mut self, error: CallError) -> Vec<Action> {
        if self.state == NegotiationState::Established {
            self.warn(format!("ignoring failure after establishment: {}", error));
            return Vec::new();
        }
        self.warn(format!("call failed: {}", error));
        self.transition(NegotiationState::Failed);
        vec![
            Action::Reject(error),
            Action::CloseTransport,
            Action::ReleaseEngine,
        ]
    }

    fn engine_config(&self, servers: Vec<IceServer>) -> EngineConfig {
        EngineConfig {
            ice_servers: IceServer::with_public_stun(servers),
            ice_transport_policy: self.policy,
        }
    }

    fn transition(&mut self, to: NegotiationState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.sink.record(&CallEvent::StateChanged { from, to });
    }

    fn note(&self, message: String) {
        self.sink.record(&CallEvent::Note(message));
    }

    fn warn(&self, message: String) {
        self.sink.record(&CallEvent::Warning(message));
    }
}

fn input_name(input: &Input) -> &'static str {
    match input {
        Input::Opened => "open",
        Input::ConnectFailed(_) => "connect failure",
        Input::Frame(_) => "frame",
        Input::TransportError(_) => "transport error",
        Input::TransportClosed { .. } => "transport close",
        Input::Engine(_) => "engine event",
        Input::EngineReady => "engine ready",
        Input::EngineFailed(_) => "engine failure",
        Input::OfferReady(_) => "offer",
        Input::OfferFailed(_) => "offer failure",
        Input::AnswerApplied => "answer applied",
        Input::AnswerRejected(_) => "answer rejection",
        Input::CandidateRejected(_) => "candidate rejection",
        Input::Cancel => "cancel",
        Input::SessionClosed => "session close",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use alohartc_protocol::{decode, IceCandidate};

    const OFFER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\n";

    fn machine(servers: Option<Vec<IceServer>>) -> (CallMachine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let mut options = CallOptions::new("d1", "tok", Arc::new(|_stream: RemoteStream| {}))
            .with_sink(sink.clone());
        if let Some(servers) = servers {
            options = options.with_ice_servers(servers);
        }
        (CallMachine::new(&options), sink)
    }

    fn relay() -> IceServer {
        IceServer::new(["turn:relay.example:3478"]).with_credentials("u", "p")
    }

    /// A machine that has sent its offer and waits for the answer.
    fn negotiating() -> (CallMachine, Arc<MemorySink>) {
        let (mut m, sink) = machine(Some(vec![relay()]));
        m.handle(Input::Opened);
        m.handle(Input::EngineReady);
        m.handle(Input::OfferReady(OFFER.into()));
        (m, sink)
    }

    fn frame(text: &str) -> Input {
        Input::Frame(decode(text))
    }

    fn sent(actions: &[Action]) -> Vec<&Signal> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn rejection(actions: &[Action]) -> Option<&CallError> {
        actions.iter().find_map(|a| match a {
            Action::Reject(e) => Some(e),
            _ => None,
        })
    }

    #[test]
    fn opened_with_servers_authenticates_then_builds_engine() {
        let (mut m, _) = machine(Some(vec![relay()]));
        let actions = m.handle(Input::Opened);

        assert_eq!(sent(&actions), vec![&Signal::AuthToken("tok".into())]);
        match &actions[1] {
            Action::BuildEngine(config) => {
                assert_eq!(config.ice_servers, vec![relay(), IceServer::public_stun()]);
                assert_eq!(config.ice_transport_policy, IceTransportPolicy::All);
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(m.state(), NegotiationState::Negotiating);
    }

    #[test]
    fn supplied_stun_fallback_is_not_duplicated() {
        let (mut m, _) = machine(Some(vec![IceServer::public_stun()]));
        let actions = m.handle(Input::Opened);
        match &actions[1] {
            Action::BuildEngine(config) => {
                assert_eq!(config.ice_servers, vec![IceServer::public_stun()])
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn opened_without_servers_requests_turn() {
        let (mut m, _) = machine(None);
        let actions = m.handle(Input::Opened);

        assert_eq!(
            sent(&actions),
            vec![&Signal::AuthToken("tok".into()), &Signal::RequestTurn]
        );
        assert_eq!(actions.len(), 2);
        assert_eq!(m.state(), NegotiationState::AwaitingCredentials);
    }

    #[test]
    fn turn_frame_builds_engine_once() {
        let (mut m, _) = machine(None);
        m.handle(Input::Opened);

        let actions = m.handle(frame(
            "turn\n{\"urls\":\"turn:relay.example:3478\",\"username\":\"u\",\"credential\":\"p\"}",
        ));
        match actions.as_slice() {
            [Action::BuildEngine(config)] => {
                assert_eq!(config.ice_servers.len(), 2);
                assert!(config.ice_servers[0].is_relay());
                assert_eq!(config.ice_servers[1], IceServer::public_stun());
            }
            other => panic!("unexpected actions: {other:?}"),
        }
        assert_eq!(m.state(), NegotiationState::Negotiating);

        let again = m.handle(frame("turn\n{\"urls\":\"turn:other:3478\"}"));
        assert!(again.is_empty());
    }

    #[test]
    fn invalid_turn_body_fails_negotiation() {
        let (mut m, _) = machine(None);
        m.handle(Input::Opened);

        let actions = m.handle(frame("turn\n{broken"));
        assert!(matches!(rejection(&actions), Some(CallError::Negotiation(_))));
        assert!(actions.iter().any(|a| matches!(a, Action::CloseTransport)));
        assert_eq!(m.state(), NegotiationState::Failed);
    }

    #[test]
    fn engine_ready_creates_receive_only_video_offer() {
        let (mut m, _) = machine(Some(vec![]));
        m.handle(Input::Opened);
        let actions = m.handle(Input::EngineReady);
        match actions.as_slice() {
            [Action::CreateOffer(constraints)] => {
                assert!(constraints.receive_video);
                assert!(!constraints.receive_audio);
            }
            other => panic!("unexpected actions: {other:?}"),
        }

        let actions = m.handle(Input::OfferReady(OFFER.into()));
        assert_eq!(sent(&actions), vec![&Signal::SdpOffer(OFFER.into())]);
    }

    #[test]
    fn answer_establishes_and_resolves() {
        let (mut m, sink) = negotiating();

        let actions = m.handle(frame("sdp-answer\nv=0\r\n"));
        assert!(matches!(actions.as_slice(), [Action::ApplyAnswer(sdp)] if sdp == "v=0\r\n"));

        let actions = m.handle(Input::AnswerApplied);
        assert!(matches!(actions.as_slice(), [Action::Resolve]));
        assert_eq!(m.state(), NegotiationState::Established);
        assert_eq!(
            sink.transitions(),
            vec![
                (NegotiationState::Connecting, NegotiationState::Negotiating),
                (NegotiationState::Negotiating, NegotiationState::Established),
            ]
        );
    }

    #[test]
    fn second_answer_is_ignored() {
        let (mut m, _) = negotiating();
        m.handle(frame("sdp-answer\nfirst"));
        m.handle(Input::AnswerApplied);

        let actions = m.handle(frame("sdp-answer\nsecond"));
        assert!(actions.is_empty());
        assert_eq!(m.state(), NegotiationState::Established);
    }

    #[test]
    fn duplicate_answer_while_first_is_applying_is_ignored() {
        let (mut m, _) = negotiating();
        assert_eq!(m.handle(frame("sdp-answer\nfirst")).len(), 1);
        assert!(m.handle(frame("sdp-answer\nsecond")).is_empty());
    }

    #[test]
    fn answer_before_offer_is_ignored() {
        let (mut m, sink) = machine(None);
        m.handle(Input::Opened);
        assert!(m.handle(frame("sdp-answer\nearly")).is_empty());
        assert_eq!(m.state(), NegotiationState::AwaitingCredentials);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn rejected_answer_fails_and_stops_processing() {
        let (mut m, _) = negotiating();
        m.handle(frame("sdp-answer\nbad"));

        let actions = m.handle(Input::AnswerRejected("malformed sdp".into()));
        match rejection(&actions) {
            Some(CallError::Negotiation(msg)) => assert!(msg.contains("malformed sdp")),
            other => panic!("unexpected rejection: {other:?}"),
        }
        assert!(actions.iter().any(|a| matches!(a, Action::ReleaseEngine)));
        assert_eq!(m.state(), NegotiationState::Failed);

        assert!(m.handle(frame("ice-candidate\n")).is_empty());
        assert!(m.handle(frame("sdp-answer\nretry")).is_empty());
    }

    #[test]
    fn close_while_negotiating_rejects_with_code() {
        let (mut m, _) = negotiating();
        let actions = m.handle(Input::TransportClosed {
            code: 1006,
            reason: String::new(),
        });
        assert_eq!(rejection(&actions).and_then(CallError::close_code), Some(1006));
        assert_eq!(m.state(), NegotiationState::Failed);
    }

    #[test]
    fn close_after_established_is_clean() {
        let (mut m, sink) = negotiating();
        m.handle(frame("sdp-answer\nok"));
        m.handle(Input::AnswerApplied);

        let actions = m.handle(Input::TransportClosed {
            code: 1000,
            reason: "bye".into(),
        });
        assert!(actions.is_empty());
        assert_eq!(m.state(), NegotiationState::Closed);
        assert!(sink.events().contains(&CallEvent::TransportClosed {
            code: 1000,
            reason: "bye".into()
        }));
    }

    #[test]
    fn transport_error_does_not_transition() {
        let (mut m, sink) = negotiating();
        assert!(m.handle(Input::TransportError("reset".into())).is_empty());
        assert_eq!(m.state(), NegotiationState::Negotiating);
        assert!(sink
            .events()
            .contains(&CallEvent::TransportError("reset".into())));
    }

    #[test]
    fn connect_failure_is_transport_error() {
        let (mut m, _) = machine(None);
        let actions = m.handle(Input::ConnectFailed("refused".into()));
        assert_eq!(
            rejection(&actions),
            Some(&CallError::Transport("refused".into()))
        );
    }

    #[test]
    fn candidate_before_engine_is_dropped() {
        let (mut m, sink) = machine(None);
        m.handle(Input::Opened);
        let actions = m.handle(frame(
            "ice-candidate\n{\"candidate\":\"candidate:1 1 udp 1 10.0.0.1 5000 typ host\",\"sdpMid\":\"0\"}",
        ));
        assert!(actions.is_empty());
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn candidate_ahead_of_answer_is_applied_immediately() {
        let (mut m, _) = negotiating();
        let actions = m.handle(frame(
            "ice-candidate\ncandidate:1 1 UDP 1 10.0.0.1 5000 typ host\nmid:0",
        ));
        assert!(matches!(actions.as_slice(), [Action::ApplyCandidate(c)] if !c.is_end()));
        assert_eq!(m.state(), NegotiationState::Negotiating);
    }

    #[test]
    fn candidates_end_with_single_end_marker() {
        let (mut m, _) = negotiating();
        let frames = [
            "ice-candidate\n{\"candidate\":\"candidate:1 1 udp 1 10.0.0.1 5000 typ host\",\"sdpMid\":\"0\"}",
            "ice-candidate\ncandidate:2 1 UDP 1 10.0.0.2 5001 typ host\nmid:0\n",
            "ice-candidate\n",
        ];

        let applied: Vec<CandidateSignal> = frames
            .iter()
            .flat_map(|f| m.handle(frame(f)))
            .filter_map(|a| match a {
                Action::ApplyCandidate(c) => Some(c),
                _ => None,
            })
            .collect();

        assert_eq!(applied.len(), 3);
        assert_eq!(applied.iter().filter(|c| c.is_end()).count(), 1);
        assert!(applied.last().is_some_and(CandidateSignal::is_end));
    }

    #[test]
    fn legacy_noise_lines_are_logged() {
        let (mut m, sink) = negotiating();
        let actions = m.handle(frame("ice-candidate\ncandidate:x 1 UDP 1\nufrag:ab\nmid:0"));
        assert_eq!(actions.len(), 1);
        assert_eq!(
            sink.warnings(),
            vec!["ignoring unrecognized ice-candidate line: ufrag:ab".to_string()]
        );
    }

    #[test]
    fn malformed_candidate_is_ignored() {
        let (mut m, sink) = negotiating();
        assert!(m.handle(frame("ice-candidate\n{oops")).is_empty());
        assert_eq!(m.state(), NegotiationState::Negotiating);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn rejected_candidate_is_not_fatal() {
        let (mut m, _) = negotiating();
        assert!(m.handle(Input::CandidateRejected("bad candidate".into())).is_empty());
        assert_eq!(m.state(), NegotiationState::Negotiating);
    }

    #[test]
    fn local_candidates_are_trickled() {
        let (mut m, _) = negotiating();
        let candidate = CandidateSignal::Candidate(IceCandidate::new("candidate:l", Some("0".into())));
        let actions = m.handle(Input::Engine(EngineEvent::LocalCandidate(candidate.clone())));
        assert_eq!(sent(&actions), vec![&Signal::ice_candidate(candidate)]);

        let actions = m.handle(Input::Engine(EngineEvent::LocalCandidate(
            CandidateSignal::EndOfCandidates,
        )));
        assert_eq!(
            sent(&actions),
            vec![&Signal::ice_candidate(CandidateSignal::EndOfCandidates)]
        );
    }

    #[test]
    fn same_stream_is_attached_once() {
        let (mut m, _) = negotiating();
        let stream = RemoteStream::new("s1", Arc::new(()));

        let first = m.handle(Input::Engine(EngineEvent::Track(stream.clone())));
        assert!(matches!(first.as_slice(), [Action::AttachStream(s)] if s.id() == "s1"));
        assert!(m.handle(Input::Engine(EngineEvent::Track(stream))).is_empty());

        let other = m.handle(Input::Engine(EngineEvent::Track(RemoteStream::new(
            "s2",
            Arc::new(()),
        ))));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn connection_state_is_logged_only() {
        let (mut m, sink) = negotiating();
        let actions = m.handle(Input::Engine(EngineEvent::ConnectionState("connected".into())));
        assert!(actions.is_empty());
        assert_eq!(m.state(), NegotiationState::Negotiating);
        assert!(sink
            .events()
            .contains(&CallEvent::ConnectionState("connected".into())));
    }

    #[test]
    fn unexpected_kinds_are_ignored() {
        let (mut m, sink) = negotiating();
        assert!(m.handle(frame("hangup\nbye")).is_empty());
        assert!(m.handle(frame("sdp-offer\nv=0")).is_empty());
        assert_eq!(sink.warnings().len(), 2);
        assert_eq!(m.state(), NegotiationState::Negotiating);
    }

    #[test]
    fn cancel_before_resolution_rejects_with_normal_closure() {
        let (mut m, _) = negotiating();
        let actions = m.handle(Input::Cancel);
        assert_eq!(
            rejection(&actions),
            Some(&CallError::TransportClosed {
                code: 1000,
                reason: "cancelled".into()
            })
        );
        assert_eq!(m.state(), NegotiationState::Failed);
    }

    #[test]
    fn cancel_after_established_is_ignored() {
        let (mut m, _) = negotiating();
        m.handle(frame("sdp-answer\nok"));
        m.handle(Input::AnswerApplied);
        assert!(m.handle(Input::Cancel).is_empty());
        assert_eq!(m.state(), NegotiationState::Established);
    }

    #[test]
    fn session_close_closes_transport() {
        let (mut m, _) = negotiating();
        m.handle(frame("sdp-answer\nok"));
        m.handle(Input::AnswerApplied);
        let actions = m.handle(Input::SessionClosed);
        assert!(matches!(actions.as_slice(), [Action::CloseTransport]));
        assert_eq!(m.state(), NegotiationState::Closed);
        assert!(m.is_finished());
    }

    #[test]
    fn relay_policy_reaches_engine_config() {
        let sink = Arc::new(MemorySink::new());
        let options = CallOptions::new("d1", "tok", Arc::new(|_stream: RemoteStream| {}))
            .with_ice_servers(vec![relay()])
            .with_ice_transport_policy(IceTransportPolicy::Relay)
            .with_sink(sink);
        let mut m = CallMachine::new(&options);
        let actions = m.handle(Input::Opened);
        assert!(matches!(
            &actions[1],
            Action::BuildEngine(c) if c.ice_transport_policy == IceTransportPolicy::Relay
        ));
    }

    #[test]
    fn state_names() {
        assert_eq!(NegotiationState::AwaitingCredentials.to_string(), "awaiting-credentials");
        assert!(NegotiationState::Failed.is_terminal());
        assert!(!NegotiationState::Established.is_terminal());
    }
}
