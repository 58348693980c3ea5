//! Newline framing for signaling messages.
//!
//! Every text message on the signaling connection is one frame:
//!
//! ```text
//! +-------------+----+---------------------------+
//! | kind        | \n | body (may contain \n)     |
//! +-------------+----+---------------------------+
//! ```
//!
//! The kind never contains a newline, so splitting on the first one is
//! lossless for any body. There is no escaping and no error path: any text
//! decodes to some frame.

use std::fmt;

/// One decoded frame: a kind tag and an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Message kind, e.g. `sdp-offer`. Never contains `\n`.
    pub kind: String,
    /// Message body; may be empty, multi-line, or JSON depending on `kind`.
    pub body: String,
}

impl WireMessage {
    /// Creates a frame from a kind and body.
    pub fn new(kind: impl Into<String>, body: impl Into<String>) -> Self {
        let kind = kind.into();
        debug_assert!(!kind.contains('\n'), "frame kind must not contain a newline");
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Encodes this frame into its wire text.
    pub fn encode(&self) -> String {
        encode(&self.kind, &self.body)
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.kind, self.body.len())
    }
}

/// Encodes a frame as `kind + "\n" + body`.
///
/// # Example
///
/// ```rust
/// use alohartc_protocol::encode;
///
/// assert_eq!(encode("auth-token", "tok"), "auth-token\ntok");
/// assert_eq!(encode("request-turn", ""), "request-turn\n");
/// ```
pub fn encode(kind: &str, body: &str) -> String {
    let mut text = String::with_capacity(kind.len() + 1 + body.len());
    text.push_str(kind);
    text.push('\n');
    text.push_str(body);
    text
}

/// Decodes wire text by splitting on the first newline.
///
/// Without a newline the whole text is the kind and the body is empty.
///
/// # Example
///
/// ```rust
/// use alohartc_protocol::decode;
///
/// let msg = decode("abc\ndef\ng");
/// assert_eq!(msg.kind, "abc");
/// assert_eq!(msg.body, "def\ng");
/// ```
pub fn decode(text: &str) -> WireMessage {
    match text.split_once('\n') {
        Some((kind, body)) => WireMessage {
            kind: kind.to_string(),
            body: body.to_string(),
        },
        None => WireMessage {
            kind: text.to_string(),
            body: String::new(),
        },
    }
}
