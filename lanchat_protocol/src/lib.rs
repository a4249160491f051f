// lanchat_protocol — wire protocol for the lanchat message relay.
//
// This crate defines the framing and message envelope used by the relay
// server (`lanchat_relay`) and chat clients to communicate over TCP. It is
// shared between both sides and has no dependency on any server or UI code.
//
// Module overview:
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  8-byte big-endian length prefix, then payload bytes.
// - `envelope.rs`: The `Envelope` message type — `text` and `file` variants
//                  discriminated by a JSON `type` tag.
//
// Design decisions:
// - **JSON serialization.** Envelopes are self-describing structured text;
//   file bytes travel base64-encoded inside the `data` field.
// - **Registration frame is raw text.** The very first frame on a connection
//   is the bare display name, not an envelope. That stage lives in the relay,
//   not here — this crate only sees the framed bytes.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing, compatible
//   with both blocking TCP streams and buffered wrappers.

pub mod envelope;
pub mod framing;

pub use envelope::{Envelope, EnvelopeError, SERVER_SENDER};
pub use framing::{MAX_FRAME_SIZE, read_frame, write_frame};
