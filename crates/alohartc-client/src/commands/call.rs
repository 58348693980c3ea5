//! `alohartc call`: place a call and hold it open.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use alohartc_protocol::IceServer;

use crate::config::ClientConfig;
use crate::engine::{IceTransportPolicy, RemoteMediaSink, RemoteStream};
use crate::error::{ClientError, ClientResult};
use crate::machine::NegotiationState;
use crate::negotiator::CallNegotiator;
use crate::options::CallOptions;

/// Arguments of the `call` subcommand.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub device_id: String,
    pub ice_servers: Vec<String>,
    pub relay_only: bool,
}

/// Global flags that override the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub token: Option<String>,
    pub timeout: Option<u64>,
}

/// Merges CLI arguments over the config file.
pub fn options(
    config: &ClientConfig,
    overrides: &Overrides,
    args: &CallArgs,
    sink: Arc<dyn RemoteMediaSink>,
) -> ClientResult<CallOptions> {
    let token = config
        .resolve_token(overrides.token.as_deref())
        .map_err(ClientError::Config)?;

    let mut options = CallOptions::new(args.device_id.clone(), token, sink)
        .with_signal_server(config.signal_server(overrides.server.as_deref()));

    let servers = if args.ice_servers.is_empty() {
        config.ice.servers()
    } else {
        Some(args.ice_servers.iter().map(|url| IceServer::new([url.as_str()])).collect())
    };
    if let Some(servers) = servers {
        options = options.with_ice_servers(servers);
    }
    let policy = if args.relay_only {
        IceTransportPolicy::Relay
    } else {
        config.ice.policy()
    };
    options = options.with_ice_transport_policy(policy);
    options.validate()?;
    Ok(options)
}

/// Places the call, then holds the session until `shutdown` completes or
/// signaling goes away. Returns the final negotiation state.
pub async fn hold(
    negotiator: &CallNegotiator,
    options: CallOptions,
    timeout: Duration,
    shutdown: impl Future<Output = ()>,
) -> ClientResult<NegotiationState> {
    let device_id = options.device_id.clone();
    let pending = negotiator.start_call(options)?;
    let cancel = pending.cancel_handle();
    info!(call_id = %pending.call_id(), device_id = %device_id, "calling");

    let mut session = match tokio::time::timeout(timeout, pending).await {
        Ok(outcome) => outcome?,
        Err(_) => {
            cancel.cancel();
            return Err(ClientError::Timeout(format!(
                "call to {} not established within {}s",
                device_id,
                timeout.as_secs()
            )));
        }
    };
    println!("connected to {} (call {})", device_id, session.call_id());

    tokio::pin!(shutdown);
    let interrupted = tokio::select! {
        _ = &mut shutdown => true,
        _ = session.signaling_closed() => false,
    };
    if !interrupted {
        warn!(device_id = %device_id, "signaling connection closed");
    }

    let state = session.state();
    session.close().await?;
    println!("call to {} ended", device_id);
    Ok(state)
}

/// Remote media sink for the CLI: reports streams, renders nothing.
fn announce_stream() -> Arc<dyn RemoteMediaSink> {
    Arc::new(|stream: RemoteStream| {
        println!("receiving remote stream {}", stream.id());
    })
}

/// Runs the `call` subcommand until Ctrl-C.
#[cfg(feature = "webrtc")]
pub async fn run(config: &ClientConfig, overrides: &Overrides, args: CallArgs) -> ClientResult<()> {
    let options = options(config, overrides, &args, announce_stream())?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    hold(
        &CallNegotiator::with_defaults(),
        options,
        config.timeout(overrides.timeout),
        shutdown,
    )
    .await
    .map(|_| ())
}

/// Runs the `call` subcommand until Ctrl-C.
#[cfg(not(feature = "webrtc"))]
pub async fn run(config: &ClientConfig, overrides: &Overrides, args: CallArgs) -> ClientResult<()> {
    options(config, overrides, &args, announce_stream())?;
    Err(ClientError::Unsupported(
        "calls need the `webrtc` feature".to_string(),
    ))
}
