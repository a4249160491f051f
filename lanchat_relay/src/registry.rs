// Shared registry of active sessions.
//
// The registry is the only shared mutable structure in the relay. A single
// `Mutex` over a `BTreeMap` guards all mutation and snapshotting — client
// counts are small, so there is no need for finer-grained locking.
//
// Broadcast never iterates the map under the lock: `snapshot()` copies the
// current entries out, so a session removing itself from inside its own
// receive loop can never deadlock against an in-flight broadcast, and a
// broadcast can never observe a mutation mid-iteration.
//
// Each entry holds the client's display name and a shared handle to its
// buffered write half. The write half has its own mutex because two parties
// write to it concurrently: the owning session (error replies) and any other
// session's broadcast.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;
use std::sync::{Arc, Mutex, PoisonError};

/// Relay-assigned connection handle (compact u64, unique per accepted
/// connection for the lifetime of the process).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

/// A client's write half, shared between its session and broadcast callers.
/// Frame writes must hold this lock for the whole frame so concurrent
/// senders never interleave a length prefix with another frame's payload.
pub type SharedWriter = Arc<Mutex<BufWriter<TcpStream>>>;

/// Wrap a connected stream's write half for registry storage.
pub fn shared_writer(stream: TcpStream) -> SharedWriter {
    Arc::new(Mutex::new(BufWriter::new(stream)))
}

/// One entry from a registry snapshot.
#[derive(Clone)]
pub struct Peer {
    pub id: ClientId,
    pub name: String,
    pub writer: SharedWriter,
}

struct Entry {
    name: String,
    writer: SharedWriter,
}

/// Concurrent-safe table of active sessions.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<BTreeMap<ClientId, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. No-op if the handle is already present — entries
    /// are added exactly once, after successful name registration.
    pub fn register(&self, id: ClientId, name: impl Into<String>, writer: SharedWriter) {
        let mut map = self.lock();
        map.entry(id).or_insert_with(|| Entry {
            name: name.into(),
            writer,
        });
    }

    /// Remove a session, returning the departing name. Returns `None` if the
    /// handle is absent, so the error path and the explicit close path can
    /// both call this without double-removal.
    pub fn unregister(&self, id: ClientId) -> Option<String> {
        self.lock().remove(&id).map(|entry| entry.name)
    }

    /// Point-in-time copy of all entries, in handle order. Safe to iterate
    /// while the registry is concurrently mutated.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.lock()
            .iter()
            .map(|(id, entry)| Peer {
                id: *id,
                name: entry.name.clone(),
                writer: entry.writer.clone(),
            })
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A poisoned lock only means another session panicked mid-operation;
    /// the map itself stays usable, so recover the guard and continue.
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ClientId, Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
