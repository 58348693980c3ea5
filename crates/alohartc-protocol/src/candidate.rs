//! Decoding of `ice-candidate` bodies.
//!
//! Three body shapes are accepted:
//!
//! - empty: the sender's end-of-candidates marker
//! - JSON `{"candidate": ..., "sdpMid": ...}`: the current format
//! - `candidate:...` / `mid:...` lines: the legacy format, still sent by older
//!   devices (deprecated, kept for compatibility)
//!
//! Outbound candidates are always JSON; see [`candidate_body`].

use serde::Deserialize;

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{CandidateSignal, IceCandidate};
use crate::ICE_CANDIDATE;

/// Which body shape a candidate was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFormat {
    /// Empty body.
    Empty,
    /// JSON object.
    Json,
    /// Newline-delimited `candidate:` / `mid:` fields.
    Legacy,
}

/// Result of decoding an `ice-candidate` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCandidate {
    /// The candidate or end-of-candidates marker.
    pub signal: CandidateSignal,
    /// Body shape it was decoded from.
    pub format: CandidateFormat,
    /// Legacy lines that were neither `candidate:` nor `mid:`.
    pub ignored_lines: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCandidate {
    #[serde(default)]
    candidate: Option<String>,
    #[serde(default)]
    sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    sdp_mline_index: Option<u16>,
}

/// Decodes an `ice-candidate` body.
///
/// A JSON or legacy body without a candidate value is treated as the
/// end-of-candidates marker, exactly like an empty body. Only a body that
/// starts with `{` but is not valid JSON is an error.
///
/// # Example
///
/// ```rust
/// use alohartc_protocol::{parse_candidate_body, CandidateFormat};
///
/// let parsed = parse_candidate_body("candidate:foo 1 UDP 1\nmid:0\n").unwrap();
/// assert_eq!(parsed.format, CandidateFormat::Legacy);
/// let c = parsed.signal.candidate().unwrap();
/// assert_eq!(c.candidate, "candidate:foo 1 UDP 1");
/// assert_eq!(c.sdp_mid.as_deref(), Some("0"));
/// ```
pub fn parse_candidate_body(body: &str) -> ProtocolResult<ParsedCandidate> {
    if body.is_empty() {
        return Ok(ParsedCandidate {
            signal: CandidateSignal::EndOfCandidates,
            format: CandidateFormat::Empty,
            ignored_lines: Vec::new(),
        });
    }

    if body.starts_with('{') {
        let raw: JsonCandidate = serde_json::from_str(body)
            .map_err(|e| ProtocolError::invalid_body(ICE_CANDIDATE, e))?;
        let signal = CandidateSignal::from(raw.candidate.map(|candidate| IceCandidate {
            candidate,
            sdp_mid: raw.sdp_mid,
            sdp_mline_index: raw.sdp_mline_index,
        }));
        return Ok(ParsedCandidate {
            signal,
            format: CandidateFormat::Json,
            ignored_lines: Vec::new(),
        });
    }

    Ok(parse_legacy(body))
}

fn parse_legacy(body: &str) -> ParsedCandidate {
    let mut candidate = None;
    let mut sdp_mid = None;
    let mut ignored_lines = Vec::new();

    for line in body.split('\n') {
        if line.is_empty() {
            continue;
        } else if line.starts_with("candidate:") {
            candidate = Some(line.to_string());
        } else if let Some(mid) = line.strip_prefix("mid:") {
            sdp_mid = Some(mid.to_string());
        } else {
            ignored_lines.push(line.to_string());
        }
    }

    ParsedCandidate {
        signal: CandidateSignal::from(candidate.map(|c| IceCandidate::new(c, sdp_mid))),
        format: CandidateFormat::Legacy,
        ignored_lines,
    }
}

/// Encodes a candidate signal as an outbound `ice-candidate` body.
///
/// The end-of-candidates marker is the empty body.
pub fn candidate_body(signal: &CandidateSignal) -> ProtocolResult<String> {
    match signal {
        CandidateSignal::Candidate(c) => Ok(serde_json::to_string(c)?),
        CandidateSignal::EndOfCandidates => Ok(String::new()),
    }
}
