//! Signaling wire framing and typed message payloads for alohartc.
//!
//! The signaling server exchanges text messages over a persistent
//! WebSocket. Each message is one frame of the form `kind\nbody`.
//!
//! # Message kinds
//!
//! | direction | kind | body |
//! |---|---|---|
//! | out | `auth-token` | raw token, always the first frame |
//! | out | `request-turn` | empty |
//! | in | `turn` | JSON relay server descriptor |
//! | out | `sdp-offer` | raw session description |
//! | in | `sdp-answer` | raw session description |
//! | both | `ice-candidate` | JSON candidate, legacy lines, or empty (end) |
//! | in | `device-status` | JSON `{deviceId, online, since}` |
//!
//! # Example
//!
//! ```rust
//! use alohartc_protocol::{decode, Signal};
//!
//! let frame = Signal::AuthToken("tok".into()).encode().unwrap();
//! assert_eq!(frame, "auth-token\ntok");
//!
//! let back = Signal::from_message(decode(&frame)).unwrap();
//! assert_eq!(back, Signal::AuthToken("tok".into()));
//! ```

mod candidate;
mod error;
mod framing;
mod signal;
mod types;

pub use candidate::{candidate_body, parse_candidate_body, CandidateFormat, ParsedCandidate};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode, encode, WireMessage};
pub use signal::Signal;
pub use types::{CandidateSignal, DeviceStatusEvent, IceCandidate, IceServer, PUBLIC_STUN_URL};

/// Client authentication token.
pub const AUTH_TOKEN: &str = "auth-token";
/// Request for relay credentials.
pub const REQUEST_TURN: &str = "request-turn";
/// Relay credentials.
pub const TURN: &str = "turn";
/// Session description offer.
pub const SDP_OFFER: &str = "sdp-offer";
/// Session description answer.
pub const SDP_ANSWER: &str = "sdp-answer";
/// Trickled ICE candidate.
pub const ICE_CANDIDATE: &str = "ice-candidate";
/// Device presence update.
pub const DEVICE_STATUS: &str = "device-status";
