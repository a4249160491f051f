// TCP client for connecting to the relay.
//
// Provides a non-blocking interface for an application thread to talk to
// the relay. Architecture:
// - `connect()` performs TCP connect + the registration frame on the calling
//   thread, then spawns a background reader thread.
// - The reader thread calls `read_frame()` in a loop, decodes `Envelope`,
//   and pushes into an `mpsc` channel.
// - The calling thread holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking; `recv_timeout()` blocks briefly
//   for tests and simple callers.
//
// This module lives in the relay crate because it is purely std TCP +
// protocol framing + mpsc — integration tests and headless tools can use it
// without any UI code.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lanchat_protocol::framing::{read_frame, write_frame};
use lanchat_protocol::{Envelope, EnvelopeError};
use thiserror::Error;

/// Errors from the client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("display name must not be empty")]
    EmptyName,
}

/// TCP client for relay communication.
pub struct ChatClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Envelope>,
    _reader_thread: Option<JoinHandle<()>>,
    name: String,
}

impl ChatClient {
    /// Connect to a relay, send the registration frame (the raw display
    /// name), and spawn a reader thread. The relay sends no acknowledgement;
    /// the first inbound envelope is usually our own join announcement.
    pub fn connect(addr: &str, name: &str) -> Result<Self, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::EmptyName);
        }

        let stream = TcpStream::connect(addr)?;
        let reader_stream = stream.try_clone()?;
        let mut writer = BufWriter::new(stream);

        write_frame(&mut writer, name.as_bytes())?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(BufReader::new(reader_stream), tx);
        });

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
            name: name.to_owned(),
        })
    }

    /// The display name this client registered with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a text message to the relay.
    pub fn send_text(&mut self, content: &str) -> Result<(), ClientError> {
        self.send_envelope(&Envelope::text(&self.name, content))
    }

    /// Send a file to the relay. The payload travels base64-encoded in a
    /// file envelope under `filename`.
    pub fn send_file(&mut self, filename: &str, payload: &[u8]) -> Result<(), ClientError> {
        self.send_envelope(&Envelope::file(&self.name, filename, payload))
    }

    /// Drain all queued inbound envelopes (non-blocking).
    pub fn poll(&self) -> Vec<Envelope> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Block up to `timeout` for the next inbound envelope.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        self.inbox.recv_timeout(timeout).ok()
    }

    /// Close the connection. The relay observes the closed channel and
    /// announces the departure; there is no explicit logout message.
    pub fn disconnect(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let frame = envelope.encode()?;
        write_frame(&mut self.writer, &frame)?;
        Ok(())
    }
}

/// Reader thread: read framed envelopes in a loop, push to the channel.
/// Exits on any read or decode error — the channel dropping tells `poll`
/// callers the connection is gone.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<Envelope>) {
    while let Ok(bytes) = read_frame(&mut reader) {
        match Envelope::decode(&bytes) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Receiver dropped; nobody is listening.
                }
            }
            Err(_) => break, // Malformed frame from the relay.
        }
    }
}
