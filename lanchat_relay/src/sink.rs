// External collaborator seams.
//
// The relay core treats persistence and identity as opaque capabilities
// behind traits, so deployments can plug in a database-backed message store
// or a real authentication service without touching the session code:
//
// - `FileSink`:        durable storage for inbound file payloads. The relay
//                      ships `DirSink`, which writes into a local directory.
// - `MessageSink`:     optional persistence of every relayed envelope.
//                      Failures are logged and never block delivery.
// - `IdentityVerifier`: optional registration gate. A rejection closes the
//                      connection before any join is announced.
//
// `DirSink` stores under the final path component of the client-supplied
// filename only. Writing the name verbatim would let a sender escape the
// storage directory with `../` sequences; a traversal attempt here collapses
// to its basename instead of being honored.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use lanchat_protocol::Envelope;
use thiserror::Error;
use tracing::debug;

/// Identity verification failure. The session is closed without a join
/// announcement when this is returned.
#[derive(Debug, Error)]
#[error("authentication rejected: {0}")]
pub struct AuthError(pub String);

/// Registration gate. `credential` is the raw registration frame; the
/// returned string becomes the session's verified display name.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<String, AuthError>;
}

/// Optional persistence hook for relayed envelopes. Called before broadcast;
/// errors are logged and non-fatal.
pub trait MessageSink: Send + Sync {
    fn persist(&self, sender: &str, room: &str, envelope: &Envelope) -> io::Result<()>;
}

/// Durable storage for inbound file payloads.
pub trait FileSink: Send + Sync {
    /// Store `payload` under `filename`, returning where it landed.
    fn store(&self, filename: &str, payload: &[u8]) -> io::Result<PathBuf>;
}

/// `FileSink` writing into a local directory (created on first store).
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reduce a client-supplied filename to a bare final component.
    /// Rejects names with no usable component (empty, `.`, `..`, or a bare
    /// directory separator) rather than guessing a name.
    fn sanitize(filename: &str) -> io::Result<&str> {
        let last = Path::new(filename).components().next_back();
        match last {
            Some(Component::Normal(name)) => name.to_str().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 filename")
            }),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable filename: {filename:?}"),
            )),
        }
    }
}

impl FileSink for DirSink {
    fn store(&self, filename: &str, payload: &[u8]) -> io::Result<PathBuf> {
        let name = Self::sanitize(filename)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        fs::write(&path, payload)?;
        debug!(?path, bytes = payload.len(), "stored file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_payload_under_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        let path = sink.store("report.pdf", b"pdf bytes").unwrap();
        assert_eq!(path, dir.path().join("report.pdf"));
        assert_eq!(fs::read(path).unwrap(), b"pdf bytes");
    }

    #[test]
    fn creates_directory_on_first_store() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("received_files");
        let sink = DirSink::new(&nested);

        sink.store("a.txt", b"x").unwrap();
        assert!(nested.join("a.txt").exists());
    }

    #[test]
    fn traversal_collapses_to_basename() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        let path = sink.store("../../etc/passwd", b"nope").unwrap();
        assert_eq!(path, dir.path().join("passwd"));
        assert!(dir.path().join("passwd").exists());
    }

    #[test]
    fn absolute_path_collapses_to_basename() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        let path = sink.store("/tmp/evil.sh", b"nope").unwrap();
        assert_eq!(path, dir.path().join("evil.sh"));
    }

    #[test]
    fn rejects_unusable_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        for bad in ["", ".", "..", "/", "a/.."] {
            let err = sink.store(bad, b"x").unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "filename {bad:?}");
        }
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        sink.store("a.txt", b"first").unwrap();
        sink.store("a.txt", b"second").unwrap();
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"second");
    }
}
