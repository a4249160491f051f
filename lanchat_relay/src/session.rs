// Per-connection session state machine.
//
// Each accepted connection runs `run_session` on its own thread and moves
// through: Connecting → Registering → Active → Closing → Closed.
//
// - Registering: the first frame is the raw display name — not an envelope.
//   An empty or non-UTF-8 name (or an identity verifier rejection) closes
//   the connection without registering and without any broadcast.
// - Active: register in the shared `Registry`, announce the join, then
//   block on `read_frame` and dispatch each decoded envelope. A malformed
//   payload is logged and skipped; the session stays active.
// - Closing: on `ChannelClosed` or an unrecoverable read error, unregister
//   (safe even if a broadcast already pruned the entry) and announce the
//   departure. This transition is the only source of "left the chat"
//   announcements — exactly one per session.
//
// Sessions never wait on each other except through the registry lock and
// each recipient's writer lock during fan-out. A session's own write half
// is shared with broadcast callers, so error replies to the sender go
// through the same mutex-guarded writer.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use lanchat_protocol::framing::{read_frame, write_frame};
use lanchat_protocol::Envelope;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastPolicy, broadcast};
use crate::error::SessionError;
use crate::registry::{ClientId, Registry, SharedWriter, shared_writer};
use crate::sink::{FileSink, IdentityVerifier, MessageSink};

/// How long a new connection may take to send its registration frame.
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay state shared by every session thread.
pub struct RelayShared {
    pub registry: Registry,
    pub policy: BroadcastPolicy,
    /// Room label handed to the message sink (a single-room relay).
    pub room: String,
    pub file_sink: Option<Box<dyn FileSink>>,
    pub message_sink: Option<Box<dyn MessageSink>>,
    pub verifier: Option<Box<dyn IdentityVerifier>>,
}

impl RelayShared {
    pub fn new(room: impl Into<String>, policy: BroadcastPolicy) -> Self {
        Self {
            registry: Registry::new(),
            policy,
            room: room.into(),
            file_sink: None,
            message_sink: None,
            verifier: None,
        }
    }
}

/// Drive one connection from accept to close. Never panics or propagates:
/// every error here is confined to this session.
pub fn run_session(shared: Arc<RelayShared>, stream: TcpStream, id: ClientId) {
    let (mut reader, writer, name) = match establish(&shared, stream, id) {
        Ok(active) => active,
        Err(err) => {
            debug!(client = id.0, %err, "connection closed before registration");
            return;
        }
    };

    match receive_loop(&shared, &mut reader, &writer, id, &name) {
        SessionError::ChannelClosed => debug!(client = id.0, %name, "client disconnected"),
        err => warn!(client = id.0, %name, %err, "session terminated"),
    }

    close(&shared, id, &name);
}

/// Connecting → Registering → Active. Reads the registration frame,
/// validates (and optionally verifies) the display name, registers the
/// session, and announces the join.
fn establish(
    shared: &RelayShared,
    stream: TcpStream,
    id: ClientId,
) -> Result<(BufReader<TcpStream>, SharedWriter, String), SessionError> {
    // Bound the handshake so a silent connection cannot hold the thread.
    stream.set_read_timeout(Some(REGISTRATION_TIMEOUT)).ok();

    let reader_stream = stream.try_clone().map_err(SessionError::Io)?;
    let mut reader = BufReader::new(reader_stream);

    let frame = read_frame(&mut reader).map_err(SessionError::from_io)?;
    let name = String::from_utf8(frame)
        .map_err(|_| SessionError::Registration("display name is not valid UTF-8".into()))?;
    let name = name.trim().to_owned();
    if name.is_empty() {
        return Err(SessionError::Registration("empty display name".into()));
    }

    // External identity check, when configured. A rejection closes the
    // session before anything was registered or announced.
    let name = match &shared.verifier {
        Some(verifier) => verifier
            .verify(&name)
            .map_err(|err| SessionError::Registration(err.to_string()))?,
        None => name,
    };

    // Clear the handshake timeout for the long-lived receive loop.
    stream.set_read_timeout(None).ok();

    let writer = shared_writer(stream);
    shared.registry.register(id, name.clone(), writer.clone());
    info!(client = id.0, %name, "registered");

    announce(shared, format!("{name} joined the chat"));
    Ok((reader, writer, name))
}

/// Active: blocking receive loop. Returns the terminal error that ends the
/// session; decode failures are non-fatal and stay inside the loop.
fn receive_loop(
    shared: &RelayShared,
    reader: &mut BufReader<TcpStream>,
    writer: &SharedWriter,
    id: ClientId,
    name: &str,
) -> SessionError {
    loop {
        let frame = match read_frame(reader) {
            Ok(frame) => frame,
            Err(err) => return SessionError::from_io(err),
        };
        match Envelope::decode(&frame) {
            Ok(envelope) => dispatch(shared, id, name, &frame, &envelope, writer),
            Err(err) => {
                warn!(client = id.0, %name, %err, "skipping malformed message");
            }
        }
    }
}

/// Route one decoded envelope: persist (optional), store files, broadcast.
fn dispatch(
    shared: &RelayShared,
    id: ClientId,
    name: &str,
    raw_frame: &[u8],
    envelope: &Envelope,
    writer: &SharedWriter,
) {
    if let Some(sink) = &shared.message_sink {
        if let Err(err) = sink.persist(envelope.sender(), &shared.room, envelope) {
            warn!(client = id.0, room = %shared.room, %err, "message sink persist failed");
        }
    }

    match envelope {
        Envelope::Text { .. } => {
            // Relay the frame bytes verbatim.
            broadcast(&shared.registry, raw_frame, shared.policy.exclusion(id));
        }
        Envelope::File { filename, .. } => {
            let payload = match envelope.file_bytes() {
                Some(Ok(bytes)) => bytes,
                _ => {
                    warn!(client = id.0, %filename, "skipping file with undecodable payload");
                    return;
                }
            };

            if let Some(sink) = &shared.file_sink {
                match sink.store(filename, &payload) {
                    Ok(path) => debug!(client = id.0, %filename, ?path, "file stored"),
                    Err(err) => {
                        warn!(client = id.0, %filename, %err, "file storage failed");
                        // Non-fatal: tell the sender, but do not broadcast
                        // a file that was never stored.
                        let notice = Envelope::server_text(format!(
                            "could not store {filename}: {err}"
                        ));
                        if let Err(err) = send_to(writer, &notice) {
                            debug!(client = id.0, %err, "failed to notify sender");
                        }
                        return;
                    }
                }
            }

            announce(shared, format!("{name} shared a file: {filename}"));
            broadcast(&shared.registry, raw_frame, shared.policy.exclusion(id));
        }
    }
}

/// Closing → Closed. Unregister (tolerates an earlier prune by a failed
/// broadcast) and announce the departure to the remaining sessions.
fn close(shared: &RelayShared, id: ClientId, name: &str) {
    shared.registry.unregister(id);
    info!(client = id.0, %name, "session closed");
    announce(shared, format!("{name} left the chat"));
}

/// Broadcast a synthetic SERVER announcement to every session.
fn announce(shared: &RelayShared, content: String) {
    match Envelope::server_text(content).encode() {
        Ok(frame) => broadcast(&shared.registry, &frame, None),
        Err(err) => warn!(%err, "failed to encode announcement"),
    }
}

/// Frame one envelope onto a single session's writer.
fn send_to(writer: &SharedWriter, envelope: &Envelope) -> Result<(), SessionError> {
    let frame = envelope.encode()?;
    let mut guard = writer.lock().unwrap_or_else(PoisonError::into_inner);
    write_frame(&mut *guard, &frame).map_err(SessionError::from_io)
}
