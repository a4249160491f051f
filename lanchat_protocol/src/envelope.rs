// Application-level message envelope.
//
// Every frame after a connection's registration frame carries one `Envelope`
// serialized as JSON. The envelope is self-describing: a `type` tag
// discriminates text messages from file transfers, so both sides decode once
// into a typed value instead of sniffing the payload shape.
//
// Wire shape:
//   {"type":"text","username":"alice","content":"hi"}
//   {"type":"file","username":"alice","filename":"report.pdf","data":"<base64>"}
//
// File payload bytes travel base64-encoded inside the JSON (`data` field) —
// the envelope is a text format, so raw bytes are not representable directly.
// The `sender` API field is named `username` on the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sender name used for synthetic relay announcements (joins, departures,
/// file notifications).
pub const SERVER_SENDER: &str = "SERVER";

/// Errors from envelope encoding/decoding.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload was not a valid envelope (bad JSON or unknown `type` tag).
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// A file envelope's `data` field was not valid base64.
    #[error("invalid file payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A decoded application message, discriminated by the wire `type` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Plain chat text.
    Text {
        #[serde(rename = "username")]
        sender: String,
        content: String,
    },
    /// A file transfer. `data` is the base64-encoded file bytes.
    File {
        #[serde(rename = "username")]
        sender: String,
        filename: String,
        data: String,
    },
}

impl Envelope {
    /// Build a text envelope.
    pub fn text(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Text {
            sender: sender.into(),
            content: content.into(),
        }
    }

    /// Build a synthetic announcement from the relay itself.
    pub fn server_text(content: impl Into<String>) -> Self {
        Self::text(SERVER_SENDER, content)
    }

    /// Build a file envelope, base64-encoding the payload bytes.
    pub fn file(sender: impl Into<String>, filename: impl Into<String>, payload: &[u8]) -> Self {
        Self::File {
            sender: sender.into(),
            filename: filename.into(),
            data: BASE64.encode(payload),
        }
    }

    /// Decode a file envelope's payload bytes. Returns `None` for text
    /// envelopes, `Some(Err(..))` if the `data` field is not valid base64.
    pub fn file_bytes(&self) -> Option<Result<Vec<u8>, EnvelopeError>> {
        match self {
            Self::Text { .. } => None,
            Self::File { data, .. } => Some(BASE64.decode(data).map_err(EnvelopeError::from)),
        }
    }

    /// The display name of whoever sent this envelope.
    pub fn sender(&self) -> &str {
        match self {
            Self::Text { sender, .. } | Self::File { sender, .. } => sender,
        }
    }

    /// Serialize to JSON bytes ready for framing.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the JSON bytes of one frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
