//! Payload types carried in frame bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// STUN server used alongside whatever relay servers are configured.
pub const PUBLIC_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// One ICE candidate as exchanged in `ice-candidate` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute, e.g. `candidate:842163049 1 udp 1677729535 ...`.
    pub candidate: String,
    /// Media stream identification tag the candidate belongs to.
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to.
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    /// Creates a candidate without an m-line index.
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_mline_index: None,
        }
    }

    /// Builder: set the m-line index.
    pub fn with_mline_index(mut self, index: u16) -> Self {
        self.sdp_mline_index = Some(index);
        self
    }
}

/// A trickled candidate or the end-of-candidates marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSignal {
    /// A discovered candidate.
    Candidate(IceCandidate),
    /// No more candidates will follow in this direction.
    EndOfCandidates,
}

impl CandidateSignal {
    /// Returns `true` for the end-of-candidates marker.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndOfCandidates)
    }

    /// Returns the candidate, if this is not the end marker.
    pub fn candidate(&self) -> Option<&IceCandidate> {
        match self {
            Self::Candidate(c) => Some(c),
            Self::EndOfCandidates => None,
        }
    }
}

impl From<Option<IceCandidate>> for CandidateSignal {
    fn from(candidate: Option<IceCandidate>) -> Self {
        match candidate {
            Some(c) if !c.candidate.is_empty() => Self::Candidate(c),
            _ => Self::EndOfCandidates,
        }
    }
}

/// Deserializes a value that can be either a single string or a Vec<String>.
/// The `urls` member of an ICE server descriptor allows both.
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrVec;

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or a sequence of strings")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Vec<String>, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<S: de::SeqAccess<'de>>(self, mut seq: S) -> Result<Vec<String>, S::Error> {
            let mut v = Vec::new();
            while let Some(s) = seq.next_element()? {
                v.push(s);
            }
            Ok(v)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// A STUN or TURN server descriptor.
///
/// The signaling server sends one of these as the body of a `turn` frame;
/// callers may also supply their own list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (`stun:`, `turn:` or `turns:`).
    #[serde(deserialize_with = "string_or_vec")]
    pub urls: Vec<String>,
    /// Relay username (time-limited for credentials issued by the server).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Relay credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Creates a server descriptor without credentials.
    pub fn new(urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            username: None,
            credential: None,
        }
    }

    /// The public STUN fallback appended to every server list.
    pub fn public_stun() -> Self {
        Self::new([PUBLIC_STUN_URL])
    }

    /// Builder: attach relay credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }

    /// Returns `true` if any URL is a TURN relay.
    pub fn is_relay(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }

    /// Returns `servers` with the public STUN fallback appended, unless one
    /// of them already lists it.
    pub fn with_public_stun(mut servers: Vec<IceServer>) -> Vec<IceServer> {
        let present = servers
            .iter()
            .any(|s| s.urls.iter().any(|u| u == PUBLIC_STUN_URL));
        if !present {
            servers.push(Self::public_stun());
        }
        servers
    }
}

/// Online/offline status change for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusEvent {
    /// Globally unique device identifier.
    pub device_id: String,
    /// Whether the device is online.
    pub online: bool,
    /// When the status last changed.
    #[serde(with = "alohartc_core::time::wire")]
    pub since: DateTime<Utc>,
}

impl DeviceStatusEvent {
    /// Creates a status event.
    pub fn new(device_id: impl Into<String>, online: bool, since: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            online,
            since,
        }
    }
}
