//! `alohartc monitor`: print device status changes.

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex};

use alohartc_core::format_timestamp;
use alohartc_protocol::DeviceStatusEvent;
use tracing::warn;

use crate::commands::call::Overrides;
use crate::config::ClientConfig;
use crate::error::{CallError, ClientError, ClientResult};
use crate::options::MonitorOptions;
use crate::presence::{PresenceMonitor, SubscriptionEnd};
use crate::transport::NORMAL_CLOSURE;

/// Close code of a close frame without a status.
const NO_STATUS: u16 = 1005;

/// Arguments of the `monitor` subcommand.
#[derive(Debug, Clone, Default)]
pub struct MonitorArgs {
    pub device: Option<String>,
    pub group: Option<String>,
    pub json: bool,
}

/// One output line for a status change.
pub fn render(event: &DeviceStatusEvent, json: bool) -> String {
    if json {
        serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    } else {
        format!(
            "{} {} since {}",
            event.device_id,
            if event.online { "online" } else { "offline" },
            format_timestamp(&event.since)
        )
    }
}

/// Subscribes and writes one line per status change to `out` until
/// `shutdown` completes or the server closes the connection.
pub async fn watch<W>(
    monitor: &PresenceMonitor,
    config: &ClientConfig,
    overrides: &Overrides,
    args: &MonitorArgs,
    out: Arc<Mutex<W>>,
    shutdown: impl Future<Output = ()>,
) -> ClientResult<SubscriptionEnd>
where
    W: Write + Send + 'static,
{
    let token = config
        .resolve_token(overrides.token.as_deref())
        .map_err(ClientError::Config)?;

    let json = args.json;
    let writer = Arc::clone(&out);
    let mut options = MonitorOptions::new(token, move |event: DeviceStatusEvent| {
        let line = render(&event, json);
        match writer.lock() {
            Ok(mut w) => {
                if let Err(e) = writeln!(w, "{}", line).and_then(|_| w.flush()) {
                    warn!(error = %e, "failed to write status line");
                }
            }
            Err(_) => warn!("status writer poisoned"),
        }
    })
    .with_signal_server(config.signal_server(overrides.server.as_deref()));
    if let Some(device) = &args.device {
        options = options.device(device.clone());
    }
    if let Some(group) = &args.group {
        options = options.group(group.clone());
    }

    let mut subscription = monitor.subscribe(options)?;
    tokio::pin!(shutdown);
    let end = tokio::select! {
        _ = &mut shutdown => {
            subscription.close();
            subscription.closed().await
        }
        end = subscription.closed() => end,
    };

    match end {
        SubscriptionEnd::ConnectFailed(err) => Err(err.into()),
        SubscriptionEnd::Closed { code, reason } if code != NORMAL_CLOSURE && code != NO_STATUS => {
            Err(ClientError::Call(CallError::TransportClosed { code, reason }))
        }
        end => Ok(end),
    }
}

/// Runs the `monitor` subcommand until Ctrl-C.
pub async fn run(config: &ClientConfig, overrides: &Overrides, args: MonitorArgs) -> ClientResult<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let out = Arc::new(Mutex::new(std::io::stdout()));
    watch(
        &PresenceMonitor::with_defaults(),
        config,
        overrides,
        &args,
        out,
        shutdown,
    )
    .await
    .map(|_| ())
}
