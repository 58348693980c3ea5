//! WebSocket signaling transport.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::transport::{
    BoxFuture, Connection, Connector, SignalTransport, TransportError, TransportEvent,
    TransportResult, ABNORMAL_CLOSURE,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code for a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens WebSocket connections with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    event_capacity: usize,
}

impl WebSocketConnector {
    /// Creates a connector buffering up to `event_capacity` inbound events.
    pub fn new(event_capacity: usize) -> Self {
        Self {
            event_capacity: event_capacity.max(1),
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, url: Url) -> BoxFuture<'_, TransportResult<Connection>> {
        let capacity = self.event_capacity;
        Box::pin(async move {
            let (stream, response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::connect(&url, e))?;
            debug!(url = %url, status = %response.status(), "websocket connected");

            let (sink, stream) = stream.split();
            let (event_tx, event_rx) = mpsc::channel(capacity);
            tokio::spawn(read_pump(stream, event_tx));

            let transport: Box<dyn SignalTransport> = Box::new(WebSocketTransport {
                sink: Mutex::new(Some(sink)),
            });
            Ok((transport, event_rx))
        })
    }
}

struct WebSocketTransport {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl SignalTransport for WebSocketTransport {
    fn send(&self, text: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::Closed)?;
            sink.send(Message::text(text))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn close(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let Some(mut sink) = self.sink.lock().await.take() else {
                return Ok(());
            };
            sink.close()
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }
}

/// Forwards inbound frames until the connection ends; `Closed` is always
/// the last event.
async fn read_pump(mut stream: SplitStream<WsStream>, events: mpsc::Sender<TransportEvent>) {
    let (code, reason) = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let event = TransportEvent::Message(text.to_string());
                if events.send(event).await.is_err() {
                    trace!("event receiver dropped, stopping read pump");
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => break close_details(frame),
            Some(Ok(Message::Binary(data))) => {
                warn!(bytes = data.len(), "ignoring binary websocket frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let reason = e.to_string();
                let _ = events.send(TransportEvent::Error(reason.clone())).await;
                break (ABNORMAL_CLOSURE, reason);
            }
            None => break (ABNORMAL_CLOSURE, String::new()),
        }
    };
    debug!(code, reason = %reason, "websocket closed");
    let _ = events.send(TransportEvent::Closed { code, reason }).await;
}

fn close_details(frame: Option<CloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
        None => (NO_STATUS_RECEIVED, String::new()),
    }
}
