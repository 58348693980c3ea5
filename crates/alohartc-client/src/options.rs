//! Call and subscription options.

use std::fmt;
use std::sync::Arc;

use url::Url;

use alohartc_protocol::{DeviceStatusEvent, IceServer};

use crate::engine::{IceTransportPolicy, RemoteMediaSink};
use crate::error::CallError;
use crate::sink::{EventSink, TracingSink};

/// Signaling server used when none is configured.
pub const DEFAULT_SIGNAL_SERVER: &str = "https://api.oahu.lanikailabs.com";

/// Options for one call attempt.
///
/// Required values are constructor arguments; everything else has a default
/// and a `with_*` builder.
#[derive(Clone)]
pub struct CallOptions {
    /// Device to call.
    pub device_id: String,
    /// Pre-issued opaque authentication token.
    pub auth_token: String,
    /// Receives the remote video stream.
    pub remote_video_sink: Arc<dyn RemoteMediaSink>,
    /// Signaling server base URL.
    pub signal_server: String,
    /// ICE servers; when absent, relay credentials are requested from the
    /// signaling server.
    pub ice_servers: Option<Vec<IceServer>>,
    /// Candidate policy handed to the engine.
    pub ice_transport_policy: IceTransportPolicy,
    /// Diagnostics sink.
    pub sink: Arc<dyn EventSink>,
}

impl CallOptions {
    /// Creates options with the required values and defaults for the rest.
    pub fn new(
        device_id: impl Into<String>,
        auth_token: impl Into<String>,
        remote_video_sink: Arc<dyn RemoteMediaSink>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            auth_token: auth_token.into(),
            remote_video_sink,
            signal_server: DEFAULT_SIGNAL_SERVER.to_string(),
            ice_servers: None,
            ice_transport_policy: IceTransportPolicy::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Builder: set the signaling server.
    pub fn with_signal_server(mut self, server: impl Into<String>) -> Self {
        self.signal_server = server.into();
        self
    }

    /// Builder: supply ICE servers and skip the relay-credential request.
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = Some(servers);
        self
    }

    /// Builder: set the candidate policy.
    pub fn with_ice_transport_policy(mut self, policy: IceTransportPolicy) -> Self {
        self.ice_transport_policy = policy;
        self
    }

    /// Builder: set the diagnostics sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Checks required values.
    pub fn validate(&self) -> Result<(), CallError> {
        require("deviceId", &self.device_id)?;
        require("authToken", &self.auth_token)?;
        let empty_server = self
            .ice_servers
            .as_ref()
            .is_some_and(|servers| servers.iter().any(|s| s.urls.is_empty()));
        if empty_server {
            return Err(CallError::configuration(
                "every ICE server needs at least one URL",
            ));
        }
        Ok(())
    }

    /// Call endpoint: `{ws|wss}://server/devices/{deviceId}/call`.
    pub fn endpoint(&self) -> Result<Url, CallError> {
        signaling_url(&self.signal_server, &["devices", &self.device_id, "call"])
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("device_id", &self.device_id)
            .field("auth_token", &"<redacted>")
            .field("signal_server", &self.signal_server)
            .field("ice_servers", &self.ice_servers)
            .field("ice_transport_policy", &self.ice_transport_policy)
            .finish_non_exhaustive()
    }
}

/// Presence status callback.
pub type StatusCallback = Arc<dyn Fn(DeviceStatusEvent) + Send + Sync>;

/// What a presence subscription watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTarget {
    Device(String),
    Group(String),
}

impl MonitorTarget {
    /// Monitor endpoint on `server`.
    pub fn endpoint(&self, server: &str) -> Result<Url, CallError> {
        match self {
            Self::Device(id) => signaling_url(server, &["monitor", "device", id]),
            Self::Group(name) => signaling_url(server, &["monitor", "group", name]),
        }
    }
}

impl fmt::Display for MonitorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device {}", id),
            Self::Group(name) => write!(f, "group {}", name),
        }
    }
}

/// Options for a presence subscription.
#[derive(Clone)]
pub struct MonitorOptions {
    /// Pre-issued opaque authentication token.
    pub auth_token: String,
    /// Invoked once per status frame.
    pub on_status: StatusCallback,
    /// Device to watch.
    pub device_id: Option<String>,
    /// Group to watch.
    pub group_name: Option<String>,
    /// Signaling server base URL.
    pub signal_server: String,
    /// Diagnostics sink.
    pub sink: Arc<dyn EventSink>,
}

impl MonitorOptions {
    /// Creates options with no target; set one with [`device`](Self::device)
    /// or [`group`](Self::group).
    pub fn new(
        auth_token: impl Into<String>,
        on_status: impl Fn(DeviceStatusEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            on_status: Arc::new(on_status),
            device_id: None,
            group_name: None,
            signal_server: DEFAULT_SIGNAL_SERVER.to_string(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Builder: watch one device.
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Builder: watch a group of devices.
    pub fn group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = Some(group_name.into());
        self
    }

    /// Builder: set the signaling server.
    pub fn with_signal_server(mut self, server: impl Into<String>) -> Self {
        self.signal_server = server.into();
        self
    }

    /// Builder: set the diagnostics sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validates the options and returns the single target.
    pub fn target(&self) -> Result<MonitorTarget, CallError> {
        require("authToken", &self.auth_token)?;
        let device = self.device_id.as_deref().filter(|s| !s.is_empty());
        let group = self.group_name.as_deref().filter(|s| !s.is_empty());
        match (device, group) {
            (Some(id), None) => Ok(MonitorTarget::Device(id.to_string())),
            (None, Some(name)) => Ok(MonitorTarget::Group(name.to_string())),
            (None, None) => Err(CallError::configuration(
                "either deviceId or groupName is required",
            )),
            (Some(_), Some(_)) => Err(CallError::configuration(
                "deviceId and groupName are mutually exclusive",
            )),
        }
    }
}

impl fmt::Debug for MonitorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorOptions")
            .field("auth_token", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("group_name", &self.group_name)
            .field("signal_server", &self.signal_server)
            .finish_non_exhaustive()
    }
}

fn require(name: &str, value: &str) -> Result<(), CallError> {
    if value.trim().is_empty() {
        Err(CallError::configuration(format!("{} is required", name)))
    } else {
        Ok(())
    }
}

/// Builds a WebSocket URL from a server base and path segments.
///
/// `http` maps to `ws`, `https` to `wss`; a bare host gets `wss`. Segments
/// are percent-encoded and appended to any path the server URL carries.
pub(crate) fn signaling_url(server: &str, segments: &[&str]) -> Result<Url, CallError> {
    let server = server.trim();
    if server.is_empty() {
        return Err(CallError::configuration("signal server is required"));
    }

    let raw = if server.contains("://") {
        server.to_string()
    } else {
        format!("wss://{}", server)
    };
    let mut url = Url::parse(&raw)
        .map_err(|e| CallError::configuration(format!("invalid signal server {}: {}", server, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CallError::configuration(format!(
                "unsupported signal server scheme: {}",
                other
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CallError::configuration(format!("cannot use scheme {}", scheme)))?;
    url.set_query(None);
    url.set_fragment(None);

    url.path_segments_mut()
        .map_err(|_| CallError::configuration(format!("signal server {} cannot have a path", server)))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}
