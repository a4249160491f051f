// lanchat_relay — TCP message relay for lanchat.
//
// The relay is a thin message broker: it accepts TCP connections from chat
// clients, registers each under the display name carried by its first frame,
// and broadcasts every subsequent text or file envelope to the connected
// sessions. File payloads can additionally be persisted through a pluggable
// sink before the notification goes out.
//
// Module overview:
// - `registry.rs`:  The shared session table — the only shared mutable
//                   structure. Register/unregister/snapshot behind one lock.
// - `session.rs`:   Per-connection state machine: registration frame,
//                   receive loop, dispatch, closing transition.
// - `broadcast.rs`: Fan-out of one frame to a registry snapshot with
//                   per-recipient error isolation and pruning.
// - `sink.rs`:      External collaborator seams — file storage, optional
//                   message persistence, optional identity verification.
// - `server.rs`:    TCP listener, accept loop, thread-per-connection.
// - `client.rs`:    Library TCP client (registration, send, poll inbox).
// - `error.rs`:     The session error taxonomy.
//
// Dependencies: `lanchat_protocol` (framing and envelope), `tracing` for
// structured logs, `thiserror` for error types.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_relay`).

pub mod broadcast;
pub mod client;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;

pub use broadcast::BroadcastPolicy;
pub use client::ChatClient;
pub use error::SessionError;
pub use registry::{ClientId, Registry};
pub use server::{RelayConfig, RelayHandle, start_relay};
