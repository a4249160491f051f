// Broadcast fan-out.
//
// One encoded frame goes to every registered session's write half, from a
// point-in-time registry snapshot. A send failure on one recipient is
// isolated: delivery to the others continues and the failed handle is
// queued for pruning. Pruning happens after the fan-out and never announces
// a departure — the owning session's own Closing transition is the only
// source of "left the chat" announcements, so a racing broadcast can never
// produce a duplicate.
//
// The fan-out itself is single-threaded per call: every recipient sees one
// call's frames in the same order. Interleaving across concurrent broadcast
// calls from different sessions is unspecified; clients must tolerate it.

use std::sync::PoisonError;

use lanchat_protocol::framing::write_frame;
use tracing::{debug, warn};

use crate::registry::{ClientId, Registry};

/// Whether relayed client envelopes are delivered back to their sender.
/// Synthetic announcements always go to everyone regardless of policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BroadcastPolicy {
    /// The sender receives its own messages back.
    #[default]
    IncludeSender,
    /// Relayed envelopes skip the originating session.
    ExcludeSender,
}

impl BroadcastPolicy {
    /// The exclusion to apply when relaying a client envelope from `sender`.
    pub fn exclusion(self, sender: ClientId) -> Option<ClientId> {
        match self {
            Self::IncludeSender => None,
            Self::ExcludeSender => Some(sender),
        }
    }
}

/// Send `frame` to every registered session except `exclude`. Failed
/// recipients are unregistered after the fan-out, silently.
pub fn broadcast(registry: &Registry, frame: &[u8], exclude: Option<ClientId>) {
    let mut failed = Vec::new();

    for peer in registry.snapshot() {
        if Some(peer.id) == exclude {
            continue;
        }
        let mut writer = peer.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = write_frame(&mut *writer, frame) {
            warn!(client = peer.id.0, name = %peer.name, %err, "broadcast send failed");
            failed.push(peer.id);
        }
    }

    // Prune without announcing: the failed session's own receive loop will
    // observe the broken stream and run its Closing transition.
    for id in failed {
        if let Some(name) = registry.unregister(id) {
            debug!(client = id.0, %name, "pruned unreachable session");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::{TcpListener, TcpStream};

    use lanchat_protocol::framing::read_frame;

    use crate::registry::shared_writer;

    use super::*;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn delivers_to_all_registered() {
        let registry = Registry::new();
        let (c1, s1) = tcp_pair();
        let (c2, s2) = tcp_pair();
        registry.register(ClientId(0), "alice", shared_writer(s1));
        registry.register(ClientId(1), "bob", shared_writer(s2));

        broadcast(&registry, b"payload", None);

        for client in [c1, c2] {
            let mut reader = BufReader::new(client);
            assert_eq!(read_frame(&mut reader).unwrap(), b"payload");
        }
    }

    #[test]
    fn exclude_skips_the_sender() {
        let registry = Registry::new();
        let (c1, s1) = tcp_pair();
        let (c2, s2) = tcp_pair();
        registry.register(ClientId(0), "alice", shared_writer(s1));
        registry.register(ClientId(1), "bob", shared_writer(s2));

        broadcast(&registry, b"from alice", Some(ClientId(0)));
        // A follow-up frame to everyone proves alice got nothing before it.
        broadcast(&registry, b"marker", None);

        let mut reader1 = BufReader::new(c1);
        assert_eq!(read_frame(&mut reader1).unwrap(), b"marker");

        let mut reader2 = BufReader::new(c2);
        assert_eq!(read_frame(&mut reader2).unwrap(), b"from alice");
        assert_eq!(read_frame(&mut reader2).unwrap(), b"marker");
    }

    #[test]
    fn failed_recipient_is_pruned_and_others_still_receive() {
        let registry = Registry::new();
        let (c1, s1) = tcp_pair();
        let (c2, s2) = tcp_pair();
        registry.register(ClientId(0), "alice", shared_writer(s1));
        registry.register(ClientId(1), "bob", shared_writer(s2));

        // Kill bob's connection so sends to him fail.
        drop(c2);
        registry.snapshot()[1]
            .writer
            .lock()
            .unwrap()
            .get_ref()
            .shutdown(std::net::Shutdown::Both)
            .unwrap();

        // A large frame forces the broken pipe to surface despite buffering.
        let big = vec![0xAAu8; 1 << 20];
        broadcast(&registry, &big, None);
        broadcast(&registry, &big, None);

        // Bob is gone from the registry; alice still receives everything.
        assert!(!registry.snapshot().iter().any(|p| p.id == ClientId(1)));
        let mut reader1 = BufReader::new(c1);
        assert_eq!(read_frame(&mut reader1).unwrap(), big);
    }

    #[test]
    fn policy_exclusion() {
        assert_eq!(BroadcastPolicy::IncludeSender.exclusion(ClientId(3)), None);
        assert_eq!(
            BroadcastPolicy::ExcludeSender.exclusion(ClientId(3)),
            Some(ClientId(3))
        );
    }
}
