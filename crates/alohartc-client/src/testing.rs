//! In-memory transport and engine doubles for driver tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use alohartc_protocol::CandidateSignal;

use crate::engine::{
    EngineConfig, EngineError, EngineEvents, EngineFactory, EngineResult, NegotiationEngine,
    OfferConstraints, SessionDescription,
};
use crate::transport::{
    BoxFuture, Connection, Connector, SignalTransport, TransportError, TransportEvent,
    TransportResult,
};

pub const MOCK_OFFER: &str = "v=0\r\no=- 42 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n";

const WAIT: Duration = Duration::from_secs(2);

/// Connector whose single connection is driven by a [`MockServer`].
pub struct MockConnector {
    connection: Mutex<Option<Connection>>,
    fail_with: Option<String>,
    attempts: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<Url>>>,
}

/// Test side of a mock connection.
pub struct MockServer {
    events: mpsc::Sender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<Url>>>,
}

struct MockTransport {
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl MockConnector {
    /// Creates a connector and the server side of its connection.
    pub fn new() -> (Arc<Self>, MockServer) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicUsize::new(0));
        let urls = Arc::new(Mutex::new(Vec::new()));

        let transport = MockTransport {
            sent: sent_tx,
            closed: Arc::clone(&closed),
        };
        let connector = Arc::new(Self {
            connection: Mutex::new(Some((Box::new(transport), event_rx))),
            fail_with: None,
            attempts: Arc::clone(&attempts),
            urls: Arc::clone(&urls),
        });
        let server = MockServer {
            events: event_tx,
            sent: sent_rx,
            closed,
            attempts,
            urls,
        };
        (connector, server)
    }

    /// Creates a connector whose connect attempts fail.
    pub fn refusing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            connection: Mutex::new(None),
            fail_with: Some(reason.to_string()),
            attempts: Arc::new(AtomicUsize::new(0)),
            urls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: Url) -> BoxFuture<'_, TransportResult<Connection>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.clone());
            if let Some(reason) = &self.fail_with {
                return Err(TransportError::connect(&url, reason));
            }
            self.connection
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TransportError::connect(&url, "already connected"))
        })
    }
}

impl SignalTransport for MockTransport {
    fn send(&self, text: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.sent.send(text).map_err(|_| TransportError::Closed)
        })
    }

    fn close(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl MockServer {
    /// Delivers an inbound text frame.
    pub async fn push(&self, text: &str) {
        self.events
            .send(TransportEvent::Message(text.to_string()))
            .await
            .unwrap();
    }

    /// Delivers a transport error.
    pub async fn error(&self, message: &str) {
        self.events
            .send(TransportEvent::Error(message.to_string()))
            .await
            .unwrap();
    }

    /// Closes the connection from the server side.
    pub async fn close(&self, code: u16, reason: &str) {
        self.events
            .send(TransportEvent::Closed {
                code,
                reason: reason.to_string(),
            })
            .await
            .unwrap();
    }

    /// Next frame written by the client.
    pub async fn next_sent(&mut self) -> String {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("transport dropped")
    }

    /// Frames written so far that have not been read yet.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client closed the connection.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until the client closes the connection.
    pub async fn wait_client_closed(&self) {
        tokio::time::timeout(WAIT, async {
            while !self.client_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client never closed the transport");
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap().clone()
    }
}

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build(EngineConfig),
    CreateOffer(OfferConstraints),
    SetLocal(String),
    SetRemote(String),
    AddCandidate(CandidateSignal),
    Close,
}

/// Engine factory recording every call in order.
#[derive(Default)]
pub struct MockEngineFactory {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    events: Mutex<Option<EngineEvents>>,
    fail_build: bool,
    reject_answer: bool,
    reject_candidates: bool,
}

/// Engine built by [`MockEngineFactory`].
pub struct MockEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    reject_answer: bool,
    reject_candidates: bool,
}

impl MockEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_build() -> Arc<Self> {
        Arc::new(Self {
            fail_build: true,
            ..Self::default()
        })
    }

    pub fn rejecting_answer() -> Arc<Self> {
        Arc::new(Self {
            reject_answer: true,
            ..Self::default()
        })
    }

    pub fn rejecting_candidates() -> Arc<Self> {
        Arc::new(Self {
            reject_candidates: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Event channel handed to the engine; available once it is built.
    pub fn events(&self) -> EngineEvents {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("engine not built yet")
    }

    pub fn remote_candidates(&self) -> Vec<CandidateSignal> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Waits until `predicate` holds for the recorded calls.
    pub async fn wait_for(&self, predicate: impl Fn(&[EngineCall]) -> bool) {
        tokio::time::timeout(WAIT, async {
            while !predicate(&self.calls()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("engine never reached the expected state");
    }
}

impl EngineFactory for MockEngineFactory {
    fn build(
        &self,
        config: EngineConfig,
        events: EngineEvents,
    ) -> BoxFuture<'_, EngineResult<Arc<dyn NegotiationEngine>>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(EngineCall::Build(config));
            if self.fail_build {
                return Err(EngineError::new("build", "no codecs"));
            }
            *self.events.lock().unwrap() = Some(events);
            Ok(Arc::new(MockEngine {
                calls: Arc::clone(&self.calls),
                reject_answer: self.reject_answer,
                reject_candidates: self.reject_candidates,
            }) as Arc<dyn NegotiationEngine>)
        })
    }
}

impl MockEngine {
    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NegotiationEngine for MockEngine {
    fn create_offer(
        &self,
        constraints: OfferConstraints,
    ) -> BoxFuture<'_, EngineResult<SessionDescription>> {
        Box::pin(async move {
            self.record(EngineCall::CreateOffer(constraints));
            Ok(SessionDescription::offer(MOCK_OFFER))
        })
    }

    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.record(EngineCall::SetLocal(description.sdp));
            Ok(())
        })
    }

    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.record(EngineCall::SetRemote(description.sdp));
            if self.reject_answer {
                return Err(EngineError::new("set_remote_description", "malformed sdp"));
            }
            Ok(())
        })
    }

    fn add_candidate(&self, candidate: CandidateSignal) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.record(EngineCall::AddCandidate(candidate));
            if self.reject_candidates {
                return Err(EngineError::new("add_candidate", "unknown mid"));
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.record(EngineCall::Close);
            Ok(())
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
