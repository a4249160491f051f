// TCP listener and accept loop for the relay.
//
// Architecture: thread-per-connection over a shared registry.
//
// - **Accept thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections, assigns each a `ClientId`, and spawns a session thread.
// - **Session threads** (one per client): run the state machine in
//   `session.rs` — registration frame, receive loop, closing transition.
// - The only shared mutable state is the `Registry` (plus each client's
//   mutex-guarded write half); there is no central event loop. A session
//   error never reaches the accept loop or any other session.
//
// Shutdown: the accept thread checks a `keep_running` flag (set to false by
// `RelayHandle::stop`) and stops accepting. Live sessions run until their
// peers disconnect; closing the process tears them down.

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::broadcast::BroadcastPolicy;
use crate::registry::ClientId;
use crate::session::{self, RelayShared};
use crate::sink::{DirSink, IdentityVerifier, MessageSink};

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop accepting and wait for the accept thread.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Where inbound files are stored. `None` disables the file sink:
    /// file envelopes are relayed without persistence.
    pub storage_dir: Option<PathBuf>,
    pub policy: BroadcastPolicy,
    /// Room label handed to the message sink.
    pub room: String,
    pub verifier: Option<Box<dyn IdentityVerifier>>,
    pub message_sink: Option<Box<dyn MessageSink>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1234,
            storage_dir: Some(PathBuf::from("received_files")),
            policy: BroadcastPolicy::IncludeSender,
            room: "lobby".into(),
            verifier: None,
            message_sink: None,
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> std::io::Result<(RelayHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let mut shared = RelayShared::new(config.room, config.policy);
    shared.file_sink = config.storage_dir.map(|dir| {
        Box::new(DirSink::new(dir)) as Box<dyn crate::sink::FileSink>
    });
    shared.message_sink = config.message_sink;
    shared.verifier = config.verifier;
    let shared = Arc::new(shared);

    let thread = thread::spawn(move || {
        accept_loop(listener, shared, keep_running_clone);
    });

    info!(%addr, "relay listening");
    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Accept connections until `keep_running` is cleared. The listener runs
/// non-blocking so the flag is checked between accepts.
fn accept_loop(listener: TcpListener, shared: Arc<RelayShared>, keep_running: Arc<AtomicBool>) {
    listener.set_nonblocking(true).ok();
    let mut next_client_id = 0u64;

    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                stream.set_nonblocking(false).ok();
                let id = ClientId(next_client_id);
                next_client_id += 1;
                info!(client = id.0, %peer_addr, "connection accepted");
                spawn_session(shared.clone(), stream, id);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                error!(%err, "accept failed, shutting down listener");
                break;
            }
        }
    }
}

fn spawn_session(shared: Arc<RelayShared>, stream: TcpStream, id: ClientId) {
    thread::spawn(move || session::run_session(shared, stream, id));
}
