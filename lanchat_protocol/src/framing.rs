// Length-delimited message framing over TCP.
//
// Provides the wire format for `envelope.rs` payloads: an 8-byte big-endian
// length prefix followed by the payload bytes. Both `write_frame` and
// `read_frame` operate on raw `&[u8]` / `Vec<u8>` — the caller handles JSON
// serialization separately, keeping this module format-agnostic.
//
// A `MAX_FRAME_SIZE` constant (32 MB) protects against unbounded allocation
// from malformed or malicious length prefixes. Base64-encoded file payloads
// are the largest expected frames.

use std::io::{self, Read, Write};

/// Maximum allowed frame size (32 MB). Protects against unbounded allocation
/// from malformed length prefixes. File payloads carry a ~4/3 base64 size
/// overhead, so 32 MB leaves room for files in the low tens of megabytes.
pub const MAX_FRAME_SIZE: u64 = 32 * 1024 * 1024;

/// Write a length-delimited frame: 8-byte big-endian length, then payload.
///
/// The two writes go out back to back and are flushed together; callers that
/// share a stream between producers must serialize calls externally (the
/// relay guards each client's write half with a mutex).
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u64;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited frame: 8-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// frame — a truncated payload is a closed channel, not a retryable protocol
/// error. Returns `InvalidData` if the declared length exceeds
/// `MAX_FRAME_SIZE`, without attempting the allocation.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf)?;
    let len = u64::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame length not addressable"))?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
