//! Responder side of one accepted connection.
//!
//! A [`Session`] reads commands one at a time and runs the matching
//! exchange to completion before reading the next:
//!
//! ```text
//!  ufile    cmd ▶ ◀ Ready|Failed  size ▶  payload ▶  ◀ Done|Failed
//!  dfile    cmd ▶ ◀ Ready(name)|Failed   ◀ size  ◀ payload
//!  rmfile   cmd ▶ ◀ Done|Failed
//!  dtar     cmd ▶ ◀ Ready(archive)|Failed ◀ size  ◀ payload
//!  display  cmd ▶ ◀ Ready|Failed          ◀ size  ◀ listing
//! ```
//!
//! Every unit is acknowledged by the receiving side (see [`crate::codec`]).
//! Command problems (bad syntax, bad path, missing file, an unreachable
//! backend) are answered with a `Failed` status and the session keeps
//! going.  Stream problems (ack timeout, disconnect, truncated payload) end
//! the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::Fetched;
use crate::codec::{Codec, Status};
use crate::command::Command;
use crate::error::{Error, ProtocolError, ValidationError};
use crate::node::Node;
use crate::state::SessionState;

/// What a session did before it ended cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Command lines received, including rejected ones.
    pub commands: usize,
    /// Commands answered with a `Failed` status.
    pub failed: usize,
}

pub struct Session<S> {
    codec: Codec<S>,
    node: Arc<Node>,
    peer: String,
    state: SessionState,
    summary: SessionSummary,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, node: Arc<Node>, peer: impl Into<String>, ack_timeout: Duration) -> Self {
        Self {
            codec: Codec::new(stream, ack_timeout),
            node,
            peer: peer.into(),
            state: SessionState::default(),
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve commands until the peer disconnects (`Ok`) or the stream breaks
    /// (`Err`).
    pub async fn run(mut self) -> Result<SessionSummary, Error> {
        log::info!("[session {}] opened on {}", self.peer, self.node.role());
        loop {
            self.transition(SessionState::AwaitingCommand);
            let line = match self.codec.recv_command().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.transition(SessionState::Closed);
                    log::info!("[session {}] peer disconnected", self.peer);
                    return Ok(self.summary);
                }
                Err(e) => return Err(self.close(e)),
            };
            self.summary.commands += 1;
            self.transition(SessionState::ParsingCommand);

            if let Err(e) = self.dispatch(&line).await {
                return Err(self.close(e));
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("[session {}] {} → {}", self.peer, self.state, next);
            self.state = next;
        }
    }

    fn close(&mut self, e: ProtocolError) -> Error {
        self.transition(SessionState::Closed);
        log::warn!("[session {}] closed: {e}", self.peer);
        e.into()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run one command.  Only errors that leave the stream unusable are
    /// returned; everything else has already been reported to the peer.
    async fn dispatch(&mut self, line: &str) -> Result<(), ProtocolError> {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => return self.reject(e.into()).await,
        };
        log::info!("[session {}] {command}", self.peer);
        self.transition(SessionState::for_command(&command));

        match command {
            Command::Upload {
                filename,
                destination,
            } => self.upload(&filename, &destination).await,
            Command::Download { path } => self.download(&path).await,
            Command::Delete { path } => self.delete(&path).await,
            Command::Archive { marker } => self.archive(&marker).await,
            Command::List { path } => self.list(&path).await,
        }
    }

    async fn upload(&mut self, filename: &str, destination: &str) -> Result<(), ProtocolError> {
        let (class, dir, name) = match self.node.check_upload(filename, destination) {
            Ok(checked) => checked,
            Err(e) => return self.reject(e.into()).await,
        };
        self.codec.send_status(&Status::Ready(String::new())).await?;
        let size = self.codec.recv_size().await?;
        let payload = self.codec.recv_payload(size).await?;
        log::debug!("[session {}] received {name} ({size} bytes)", self.peer);

        let outcome = self.node.put(class, &dir, &name, payload).await;
        self.finish(outcome).await
    }

    async fn download(&mut self, path: &str) -> Result<(), ProtocolError> {
        let outcome = match self.node.check_file(path) {
            Ok((class, path)) => self.node.get(class, &path).await,
            Err(e) => Err(e.into()),
        };
        self.send_fetched(outcome).await
    }

    async fn delete(&mut self, path: &str) -> Result<(), ProtocolError> {
        let outcome = match self.node.check_file(path) {
            Ok((class, path)) => self.node.remove(class, &path).await,
            Err(e) => Err(e.into()),
        };
        self.finish(outcome).await
    }

    async fn archive(&mut self, marker: &str) -> Result<(), ProtocolError> {
        let outcome = match self.node.check_archive(marker) {
            Ok(class) => self.node.archive(class).await,
            Err(e) => Err(e.into()),
        };
        self.send_fetched(outcome).await
    }

    async fn list(&mut self, path: &str) -> Result<(), ProtocolError> {
        let outcome = match self.node.check_dir(path) {
            Ok(dir) => self.node.list(&dir).await.map(|entries| Fetched {
                name: format!("{} entries", entries.len()),
                bytes: entries.join("\n").into_bytes(),
            }),
            Err(e) => Err(e.into()),
        };
        self.send_fetched(outcome).await
    }

    // -----------------------------------------------------------------------
    // Replies
    // -----------------------------------------------------------------------

    /// `Ready(name)`, then the size and payload; or `Failed`.
    async fn send_fetched(&mut self, outcome: Result<Fetched, Error>) -> Result<(), ProtocolError> {
        let fetched = match outcome {
            Ok(fetched) => fetched,
            Err(e) => return self.reject(e).await,
        };
        let size = match u32::try_from(fetched.bytes.len()) {
            Ok(size) => size,
            Err(_) => {
                let e = ValidationError::TooLarge {
                    path: fetched.name,
                    size: fetched.bytes.len() as u64,
                };
                return self.reject(e.into()).await;
            }
        };
        self.codec.send_status(&Status::Ready(fetched.name)).await?;
        self.codec.send_size(size).await?;
        self.codec.send_payload(&fetched.bytes).await
    }

    async fn finish(&mut self, outcome: Result<String, Error>) -> Result<(), ProtocolError> {
        match outcome {
            Ok(message) => self.codec.send_status(&Status::Done(message)).await,
            Err(e) => self.reject(e).await,
        }
    }

    async fn reject(&mut self, e: Error) -> Result<(), ProtocolError> {
        match e {
            Error::Protocol(p) if !matches!(p, ProtocolError::MalformedCommand(_)) => Err(p),
            other => self.send_failed(other.to_string()).await,
        }
    }

    async fn send_failed(&mut self, message: String) -> Result<(), ProtocolError> {
        log::warn!("[session {}] failed: {message}", self.peer);
        self.summary.failed += 1;
        self.codec.send_status(&Status::Failed(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FileClass;
    use crate::client::Client;
    use crate::config::{NodeConfig, Role};
    use crate::path::StoragePath;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::io::duplex;

    const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    fn unused() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    async fn text_store(tmp: &TempDir) -> Arc<Node> {
        let node = Node::new(&NodeConfig::store(Role::TextStore, unused(), tmp.path().join("stext")));
        node.store().ensure_root().await.unwrap();
        Arc::new(node)
    }

    fn start(
        node: Arc<Node>,
    ) -> (
        Client<tokio::io::DuplexStream>,
        tokio::task::JoinHandle<Result<SessionSummary, Error>>,
    ) {
        let (a, b) = duplex(4096);
        let session = Session::new(b, node, "test", TEST_TIMEOUT);
        assert_eq!(session.state(), SessionState::AwaitingCommand);
        let handle = tokio::spawn(session.run());
        (Client::new(a, "stext", TEST_TIMEOUT), handle)
    }

    #[tokio::test]
    async fn upload_download_delete_on_a_backend() {
        let tmp = TempDir::new().unwrap();
        let node = text_store(&tmp).await;
        let (mut client, handle) = start(node);

        let docs = StoragePath::from_relative("docs").unwrap();
        client.upload_bytes("notes.txt", &docs, b"hello world!").await.unwrap();
        assert_eq!(
            std::fs::read(tmp.path().join("stext/docs/notes.txt")).unwrap(),
            b"hello world!"
        );

        let path = docs.join("notes.txt").unwrap();
        let fetched = client.download(&path).await.unwrap();
        assert_eq!(fetched.name, "notes.txt");
        assert_eq!(fetched.bytes, b"hello world!");

        client.delete(&path).await.unwrap();
        assert!(!tmp.path().join("stext/docs/notes.txt").exists());

        drop(client);
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, SessionSummary { commands: 3, failed: 0 });
    }

    #[tokio::test]
    async fn refused_commands_keep_the_session_open() {
        let tmp = TempDir::new().unwrap();
        let node = text_store(&tmp).await;
        let (mut client, handle) = start(node);

        // A backend owns exactly one class.
        let err = client
            .upload_bytes("main.c", &StoragePath::root(), b"int x;")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected(ref m) if m.contains("no store")), "{err}");

        let missing = StoragePath::from_relative("absent.txt").unwrap();
        let err = client.download(&missing).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(ref m) if m.contains("does not exist")), "{err}");

        // Still usable afterwards.
        assert!(client.list(&StoragePath::root()).await.unwrap().is_empty());

        drop(client);
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, SessionSummary { commands: 3, failed: 2 });
    }

    #[tokio::test]
    async fn malformed_command_is_answered_with_failed() {
        let tmp = TempDir::new().unwrap();
        let node = text_store(&tmp).await;
        let (a, b) = duplex(4096);
        let handle = tokio::spawn(Session::new(b, node, "test", TEST_TIMEOUT).run());

        let mut codec = Codec::new(a, TEST_TIMEOUT);
        codec.send_command("frobnicate ~stext").await.unwrap();
        assert!(matches!(codec.recv_status().await.unwrap(), Status::Failed(_)));
        codec.send_command("ufile only-one-arg").await.unwrap();
        assert!(matches!(codec.recv_status().await.unwrap(), Status::Failed(_)));

        drop(codec);
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.failed, 2);
    }

    #[tokio::test]
    async fn truncated_upload_ends_the_session_without_storing() {
        let tmp = TempDir::new().unwrap();
        let node = text_store(&tmp).await;
        let (a, b) = duplex(4096);
        let handle = tokio::spawn(Session::new(b, node, "test", TEST_TIMEOUT).run());

        let mut codec = Codec::new(a, TEST_TIMEOUT);
        codec.send_command("ufile cut.txt ~stext").await.unwrap();
        assert!(matches!(codec.recv_status().await.unwrap(), Status::Ready(_)));
        codec.send_size(100).await.unwrap();
        // Ten bytes of a promised hundred, then hang up.
        use tokio::io::AsyncWriteExt;
        let mut raw = codec.into_inner();
        raw.write_all(&[b'x'; 10]).await.unwrap();
        drop(raw);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Truncated { expected: 100, received: 10 })));
        assert!(!tmp.path().join("stext/cut.txt").exists());
    }

    #[tokio::test]
    async fn archive_reports_its_name() {
        let tmp = TempDir::new().unwrap();
        let node = text_store(&tmp).await;
        let (mut client, _handle) = start(node);

        client
            .upload_bytes("a.txt", &StoragePath::root(), b"alpha")
            .await
            .unwrap();
        let fetched = client.archive(FileClass::Text).await.unwrap();
        assert_eq!(fetched.name, "text.tar");
        let mut archive = tar::Archive::new(std::io::Cursor::new(fetched.bytes));
        assert_eq!(archive.entries().unwrap().count(), 1);
    }
}
