//! Device presence subscriptions.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, info_span, Instrument};
use url::Url;

use alohartc_protocol::{decode, Signal};

use crate::error::CallError;
use crate::options::{MonitorOptions, MonitorTarget};
use crate::sink::CallEvent;
use crate::transport::{Connector, TransportEvent, ABNORMAL_CLOSURE, NORMAL_CLOSURE};

/// How a subscription ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEnd {
    /// The connection closed, from either side.
    Closed { code: u16, reason: String },
    /// The connection could not be opened.
    ConnectFailed(CallError),
}

/// Opens presence subscriptions.
#[derive(Clone)]
pub struct PresenceMonitor {
    connector: Arc<dyn Connector>,
}

impl PresenceMonitor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Monitor using the WebSocket transport.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(crate::websocket::WebSocketConnector::default()))
    }

    /// Subscribes to status changes of one device or one group.
    ///
    /// Fails synchronously unless exactly one of `device_id` and
    /// `group_name` is set. `on_status` runs on the subscription task, once
    /// per `device-status` frame. Must be called within a Tokio runtime.
    pub fn subscribe(&self, options: MonitorOptions) -> Result<Subscription, CallError> {
        let target = options.target()?;
        let url = target.endpoint(&options.signal_server)?;

        let (close_tx, close_rx) = oneshot::channel();
        let (end_tx, end_rx) = oneshot::channel();
        let span = info_span!("presence", target = %target);
        tokio::spawn(
            run(Arc::clone(&self.connector), url, options, close_rx, end_tx).instrument(span),
        );

        Ok(Subscription {
            target,
            close: Some(close_tx),
            end: end_rx,
        })
    }
}

/// A live presence subscription.
///
/// Dropping the subscription closes it.
#[derive(Debug)]
pub struct Subscription {
    target: MonitorTarget,
    close: Option<oneshot::Sender<()>>,
    end: oneshot::Receiver<SubscriptionEnd>,
}

impl Subscription {
    /// What this subscription watches.
    pub fn target(&self) -> &MonitorTarget {
        &self.target
    }

    /// Closes the transport; no callbacks run after the close completes.
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }

    /// Waits until the subscription ends.
    pub async fn closed(&mut self) -> SubscriptionEnd {
        (&mut self.end).await.unwrap_or_else(|_| SubscriptionEnd::Closed {
            code: ABNORMAL_CLOSURE,
            reason: "subscription task stopped".to_string(),
        })
    }
}

async fn run(
    connector: Arc<dyn Connector>,
    url: Url,
    options: MonitorOptions,
    mut close_rx: oneshot::Receiver<()>,
    end_tx: oneshot::Sender<SubscriptionEnd>,
) {
    info!(url = %url, "subscribing to presence");
    let connected = tokio::select! {
        result = connector.connect(url) => result,
        _ = &mut close_rx => {
            let _ = end_tx.send(SubscriptionEnd::Closed {
                code: NORMAL_CLOSURE,
                reason: "closed before connecting".to_string(),
            });
            return;
        }
    };
    let (transport, mut events) = match connected {
        Ok(connection) => connection,
        Err(e) => {
            options.sink.record(&CallEvent::TransportError(e.to_string()));
            let _ = end_tx.send(SubscriptionEnd::ConnectFailed(CallError::Transport(
                e.to_string(),
            )));
            return;
        }
    };

    let auth = Signal::AuthToken(options.auth_token.clone());
    match auth.encode() {
        Ok(text) => {
            options.sink.record(&CallEvent::FrameSent {
                kind: auth.kind().to_string(),
                bytes: options.auth_token.len(),
            });
            if let Err(e) = transport.send(text).await {
                options.sink.record(&CallEvent::TransportError(e.to_string()));
            }
        }
        Err(e) => options
            .sink
            .record(&CallEvent::Warning(format!("failed to encode auth-token: {}", e))),
    }

    let end = loop {
        tokio::select! {
            _ = &mut close_rx => {
                if let Err(e) = transport.close().await {
                    debug!(error = %e, "closing presence transport");
                }
                break SubscriptionEnd::Closed {
                    code: NORMAL_CLOSURE,
                    reason: "closed by subscriber".to_string(),
                };
            }
            event = events.recv() => match event {
                Some(TransportEvent::Message(text)) => on_frame(&options, &text),
                Some(TransportEvent::Error(error)) => {
                    options.sink.record(&CallEvent::TransportError(error));
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    options.sink.record(&CallEvent::TransportClosed {
                        code,
                        reason: reason.clone(),
                    });
                    break SubscriptionEnd::Closed { code, reason };
                }
                None => break SubscriptionEnd::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: "transport event stream ended".to_string(),
                },
            },
        }
    };
    debug!(?end, "presence subscription ended");
    let _ = end_tx.send(end);
}

fn on_frame(options: &MonitorOptions, text: &str) {
    let message = decode(text);
    options.sink.record(&CallEvent::FrameReceived {
        kind: message.kind.clone(),
        bytes: message.body.len(),
    });
    let kind = message.kind.clone();
    match Signal::from_message(message) {
        Ok(Signal::DeviceStatus(event)) => {
            debug!(device_id = %event.device_id, online = event.online, "device status");
            (options.on_status)(event);
        }
        Ok(other) => options.sink.record(&CallEvent::Warning(format!(
            "ignoring unexpected {} frame",
            other.kind()
        ))),
        Err(e) => options.sink.record(&CallEvent::Warning(format!(
            "ignoring malformed {} frame: {}",
            kind, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::testing::MockConnector;
    use alohartc_protocol::DeviceStatusEvent;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    fn recorder() -> (
        Arc<Mutex<Vec<DeviceStatusEvent>>>,
        impl Fn(DeviceStatusEvent) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: DeviceStatusEvent| sink.lock().unwrap().push(event))
    }

    async fn wait_until(predicate: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !predicate() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn status_frame_invokes_callback_once() {
        let (connector, mut server) = MockConnector::new();
        let (seen, on_status) = recorder();
        let options = MonitorOptions::new("tok", on_status)
            .device("d1")
            .with_signal_server("https://signal.test");

        let mut subscription = PresenceMonitor::new(connector).subscribe(options).unwrap();
        assert_eq!(server.next_sent().await, "auth-token\ntok");

        server
            .push(r#"device-status
{"deviceId":"d1","online":false,"since":"2024-01-01T00:00:00Z"}"#)
            .await;
        wait_until(|| !seen.lock().unwrap().is_empty()).await;

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![DeviceStatusEvent::new(
                "d1",
                false,
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            )]
        );
        assert_eq!(
            server.urls()[0].as_str(),
            "wss://signal.test/monitor/device/d1"
        );

        subscription.close();
        assert_eq!(
            subscription.closed().await,
            SubscriptionEnd::Closed {
                code: 1000,
                reason: "closed by subscriber".into()
            }
        );
        assert!(server.client_closed());
    }

    #[tokio::test]
    async fn every_frame_is_delivered_without_dedup() {
        let (connector, mut server) = MockConnector::new();
        let (seen, on_status) = recorder();
        let options = MonitorOptions::new("tok", on_status).group("lobby");
        let _subscription = PresenceMonitor::new(connector).subscribe(options).unwrap();
        server.next_sent().await;

        let frame = r#"device-status
{"deviceId":"d2","online":true,"since":1704067200000}"#;
        server.push(frame).await;
        server.push(frame).await;
        wait_until(|| seen.lock().unwrap().len() == 2).await;

        let events = seen.lock().unwrap().clone();
        assert!(events.iter().all(|e| e.online && e.device_id == "d2"));
        assert_eq!(events[0].since, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(server.urls()[0].path(), "/monitor/group/lobby");
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_are_ignored() {
        let (connector, mut server) = MockConnector::new();
        let (seen, on_status) = recorder();
        let sink = Arc::new(MemorySink::new());
        let options = MonitorOptions::new("tok", on_status)
            .device("d1")
            .with_sink(sink.clone());
        let _subscription = PresenceMonitor::new(connector).subscribe(options).unwrap();
        server.next_sent().await;

        server.push("firmware-update\n{}").await;
        server.push("device-status\n{not json").await;
        server
            .push(r#"device-status
{"deviceId":"d1","online":true,"since":"2024-06-01T12:00:00Z"}"#)
            .await;
        wait_until(|| seen.lock().unwrap().len() == 1).await;
        assert_eq!(sink.warnings().len(), 2);
    }

    #[tokio::test]
    async fn server_close_ends_subscription() {
        let (connector, server) = MockConnector::new();
        let options = MonitorOptions::new("tok", |_| {}).device("d1");
        let mut subscription = PresenceMonitor::new(connector).subscribe(options).unwrap();

        server.close(4001, "unauthorized").await;
        assert_eq!(
            subscription.closed().await,
            SubscriptionEnd::Closed {
                code: 4001,
                reason: "unauthorized".into()
            }
        );
    }

    #[tokio::test]
    async fn connect_failure_ends_subscription() {
        let connector = MockConnector::refusing("no route to host");
        let options = MonitorOptions::new("tok", |_| {}).device("d1");
        let mut subscription = PresenceMonitor::new(connector).subscribe(options).unwrap();
        assert!(matches!(
            subscription.closed().await,
            SubscriptionEnd::ConnectFailed(CallError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn missing_target_never_connects() {
        let (connector, server) = MockConnector::new();
        let monitor = PresenceMonitor::new(connector);

        let err = monitor
            .subscribe(MonitorOptions::new("tok", |_| {}))
            .unwrap_err();
        assert!(matches!(err, CallError::Configuration(_)));

        let err = monitor
            .subscribe(MonitorOptions::new("tok", |_| {}).device("d1").group("g"))
            .unwrap_err();
        assert!(matches!(err, CallError::Configuration(_)));

        tokio::task::yield_now().await;
        assert_eq!(server.attempts(), 0);
    }
}
