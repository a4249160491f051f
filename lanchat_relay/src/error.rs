// Error taxonomy for the relay.
//
// Four failure kinds with distinct consequences:
// - `Protocol`: a frame arrived but was not a valid envelope. Non-fatal —
//   the session skips the message and stays active.
// - `ChannelClosed`: the peer disconnected (clean EOF or a reset). Fatal to
//   the session; triggers the Closing transition.
// - `Io`: any other send/receive/storage failure. Fatal to the operation it
//   occurred in, never to the process.
// - `Registration`: the connection never produced a usable display name.
//   Fatal before the session became active, so no departure is announced.

use std::io;

use lanchat_protocol::EnvelopeError;
use thiserror::Error;

/// Errors confined to a single client session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed frame payload. Skip the message, keep the session alive.
    #[error("malformed message: {0}")]
    Protocol(#[from] EnvelopeError),

    /// Peer disconnected or the stream ended mid-frame.
    #[error("channel closed")]
    ChannelClosed,

    /// Send/receive failure other than a disconnect.
    #[error("i/o error: {0}")]
    Io(io::Error),

    /// Empty or invalid display name, or the identity verifier refused the
    /// connection.
    #[error("registration failed: {0}")]
    Registration(String),
}

impl SessionError {
    /// Classify an I/O error from a blocking frame read or write. EOF and
    /// the usual disconnect kinds mean the channel is closed; anything else
    /// stays a plain I/O error.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ChannelClosed,
            _ => Self::Io(err),
        }
    }
}
