//! Typed signaling messages.
//!
//! [`Signal`] is the closed set of message kinds the client understands,
//! decoded from a [`WireMessage`] at the connection boundary. Kinds the
//! client does not know are kept as [`Signal::Unknown`] so that newer
//! servers can add messages without breaking older clients.

use crate::candidate::{candidate_body, parse_candidate_body};
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::WireMessage;
use crate::types::{CandidateSignal, DeviceStatusEvent, IceServer};
use crate::{AUTH_TOKEN, DEVICE_STATUS, ICE_CANDIDATE, REQUEST_TURN, SDP_ANSWER, SDP_OFFER, TURN};

/// A signaling message with its payload decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Client authentication; must be the first frame on a connection.
    AuthToken(String),
    /// Client asks the server for relay credentials.
    RequestTurn,
    /// Relay credentials issued by the server.
    Turn(IceServer),
    /// Local session description offered to the device.
    SdpOffer(String),
    /// Session description answered by the device.
    SdpAnswer(String),
    /// A trickled candidate or the end-of-candidates marker.
    IceCandidate {
        candidate: CandidateSignal,
        /// Unrecognized legacy lines, kept so the receiver can log them.
        ignored_lines: Vec<String>,
    },
    /// Presence update for a monitored device.
    DeviceStatus(DeviceStatusEvent),
    /// A kind this client does not understand.
    Unknown { kind: String, body: String },
}

impl Signal {
    /// Creates an outbound candidate signal.
    pub fn ice_candidate(candidate: CandidateSignal) -> Self {
        Self::IceCandidate {
            candidate,
            ignored_lines: Vec::new(),
        }
    }

    /// Returns the wire kind of this signal.
    pub fn kind(&self) -> &str {
        match self {
            Self::AuthToken(_) => AUTH_TOKEN,
            Self::RequestTurn => REQUEST_TURN,
            Self::Turn(_) => TURN,
            Self::SdpOffer(_) => SDP_OFFER,
            Self::SdpAnswer(_) => SDP_ANSWER,
            Self::IceCandidate { .. } => ICE_CANDIDATE,
            Self::DeviceStatus(_) => DEVICE_STATUS,
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Decodes the payload of a frame.
    ///
    /// Unknown kinds never fail. Known kinds fail only when their body does
    /// not hold the payload they require.
    pub fn from_message(message: WireMessage) -> ProtocolResult<Self> {
        let WireMessage { kind, body } = message;
        let signal = match kind.as_str() {
            AUTH_TOKEN => Self::AuthToken(body),
            REQUEST_TURN => Self::RequestTurn,
            TURN => Self::Turn(
                serde_json::from_str(&body).map_err(|e| ProtocolError::invalid_body(TURN, e))?,
            ),
            SDP_OFFER => Self::SdpOffer(body),
            SDP_ANSWER => Self::SdpAnswer(body),
            ICE_CANDIDATE => {
                let parsed = parse_candidate_body(&body)?;
                Self::IceCandidate {
                    candidate: parsed.signal,
                    ignored_lines: parsed.ignored_lines,
                }
            }
            DEVICE_STATUS => Self::DeviceStatus(
                serde_json::from_str(&body)
                    .map_err(|e| ProtocolError::invalid_body(DEVICE_STATUS, e))?,
            ),
            _ => Self::Unknown { kind, body },
        };
        Ok(signal)
    }

    /// Decodes wire text directly.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Self::from_message(crate::framing::decode(text))
    }

    /// Builds the frame for this signal.
    pub fn to_message(&self) -> ProtocolResult<WireMessage> {
        let body = match self {
            Self::AuthToken(token) => token.clone(),
            Self::RequestTurn => String::new(),
            Self::Turn(server) => serde_json::to_string(server)?,
            Self::SdpOffer(sdp) | Self::SdpAnswer(sdp) => sdp.clone(),
            Self::IceCandidate { candidate, .. } => candidate_body(candidate)?,
            Self::DeviceStatus(event) => serde_json::to_string(event)?,
            Self::Unknown { body, .. } => body.clone(),
        };
        Ok(WireMessage::new(self.kind(), body))
    }

    /// Encodes this signal into wire text.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(self.to_message()?.encode())
    }
}
