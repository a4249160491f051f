// Integration smoke test for the relay server.
//
// Starts a relay on localhost, connects real TCP clients, and exercises the
// full protocol lifecycle: registration, join announcements, text exchange,
// file transfer with storage, abrupt disconnect, and oversized-frame
// rejection. Clients use the library `ChatClient` where possible and drop to
// raw framing where the test needs to misbehave on purpose.

use std::io::BufReader;
use std::net::TcpStream;
use std::time::Duration;

use lanchat_protocol::framing::{read_frame, write_frame, MAX_FRAME_SIZE};
use lanchat_protocol::{Envelope, SERVER_SENDER};
use lanchat_relay::client::ChatClient;
use lanchat_relay::server::{RelayConfig, start_relay};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config(storage_dir: Option<std::path::PathBuf>) -> RelayConfig {
    RelayConfig {
        port: 0, // OS picks a free port
        storage_dir,
        ..RelayConfig::default()
    }
}

/// Block until the client yields the expected SERVER announcement, skipping
/// unrelated traffic along the way.
fn wait_for_announcement(client: &ChatClient, expected: &str) {
    for _ in 0..50 {
        match client.recv_timeout(RECV_TIMEOUT) {
            Some(Envelope::Text { sender, content })
                if sender == SERVER_SENDER && content == expected =>
            {
                return;
            }
            Some(_) => {}
            None => break,
        }
    }
    panic!("did not receive announcement {expected:?}");
}

#[test]
fn full_chat_lifecycle() {
    let storage = tempfile::tempdir().unwrap();
    let (handle, addr) = start_relay(test_config(Some(storage.path().into()))).unwrap();

    // Give the accept thread a moment to start.
    std::thread::sleep(Duration::from_millis(50));

    // Registration + join announcements.
    let mut alice = ChatClient::connect(&addr.to_string(), "alice").unwrap();
    wait_for_announcement(&alice, "alice joined the chat");

    let mut bob = ChatClient::connect(&addr.to_string(), "bob").unwrap();
    wait_for_announcement(&bob, "bob joined the chat");
    wait_for_announcement(&alice, "bob joined the chat");

    // Text relays verbatim in both directions.
    alice.send_text("hello bob").unwrap();
    assert_eq!(
        bob.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("alice", "hello bob"))
    );
    // Default policy: the sender gets its own message back too.
    assert_eq!(
        alice.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("alice", "hello bob"))
    );

    bob.send_text("hello alice").unwrap();
    assert_eq!(
        alice.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("bob", "hello alice"))
    );
    assert_eq!(
        bob.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("bob", "hello alice"))
    );

    // File transfer: announcement, identical envelope, identical stored bytes.
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    alice.send_file("report.pdf", &payload).unwrap();

    wait_for_announcement(&bob, "alice shared a file: report.pdf");
    match bob.recv_timeout(RECV_TIMEOUT) {
        Some(env @ Envelope::File { .. }) => {
            assert_eq!(env, Envelope::file("alice", "report.pdf", &payload));
            assert_eq!(env.file_bytes().unwrap().unwrap(), payload);
        }
        other => panic!("expected file envelope, got {other:?}"),
    }
    let stored = std::fs::read(storage.path().join("report.pdf")).unwrap();
    assert_eq!(stored.len(), payload.len());
    assert_eq!(stored, payload);

    // Abrupt disconnect: exactly one departure announcement reaches bob.
    alice.disconnect();
    wait_for_announcement(&bob, "alice left the chat");

    // Bob's next frame is his own echo, not a duplicate departure.
    bob.send_text("anyone there?").unwrap();
    assert_eq!(
        bob.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("bob", "anyone there?"))
    );

    handle.stop();
}

#[test]
fn oversized_frame_closes_the_offending_session_only() {
    let (handle, addr) = start_relay(test_config(None)).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let mut bob = ChatClient::connect(&addr.to_string(), "bob").unwrap();
    wait_for_announcement(&bob, "bob joined the chat");

    // Raw client that declares an absurd frame length after registering.
    let mut evil = TcpStream::connect(addr).unwrap();
    evil.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
    write_frame(&mut evil, b"evil").unwrap();
    wait_for_announcement(&bob, "evil joined the chat");

    use std::io::Write;
    evil.write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes()).unwrap();
    evil.flush().unwrap();

    // The relay rejects the frame without allocating and closes the session.
    let mut evil_reader = BufReader::new(evil);
    loop {
        match read_frame(&mut evil_reader) {
            Ok(_) => {} // drain announcements already in flight
            Err(_) => break,
        }
    }
    wait_for_announcement(&bob, "evil left the chat");

    // The rest of the relay is unaffected.
    bob.send_text("still works").unwrap();
    assert_eq!(
        bob.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("bob", "still works"))
    );

    handle.stop();
}

#[test]
fn late_joiner_sees_only_subsequent_traffic() {
    let (handle, addr) = start_relay(test_config(None)).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let mut alice = ChatClient::connect(&addr.to_string(), "alice").unwrap();
    wait_for_announcement(&alice, "alice joined the chat");
    alice.send_text("before carol").unwrap();
    assert_eq!(
        alice.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("alice", "before carol"))
    );

    let carol = ChatClient::connect(&addr.to_string(), "carol").unwrap();
    wait_for_announcement(&carol, "carol joined the chat");

    alice.send_text("after carol").unwrap();
    // Carol never sees the earlier message; her first chat frame is the
    // one sent after she registered.
    assert_eq!(
        carol.recv_timeout(RECV_TIMEOUT),
        Some(Envelope::text("alice", "after carol"))
    );

    handle.stop();
}
