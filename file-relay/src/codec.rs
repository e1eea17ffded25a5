//! Unit framing for the acknowledgment-gated transfer protocol.
//!
//! A [`Codec`] wraps any async byte stream and speaks in *units*.  Every
//! unit follows the same two-step handshake, regardless of which side
//! initiated the connection:
//!
//! ```text
//!   sender                              receiver
//!     │ ── unit bytes ─────────────────────▶ │  consume the whole unit
//!     │ ◀──────────────────────────── ACK ── │
//!     │  (blocks ≤ ack_timeout)              │
//!     ▼  next unit                           ▼
//! ```
//!
//! # Units on the wire
//!
//! | Unit    | Encoding                                                      |
//! |---------|---------------------------------------------------------------|
//! | command | UTF-8 text, no terminator, framed by one read (≤ [`BUFFER_SIZE`]) |
//! | size    | `u32`, big-endian                                             |
//! | payload | exactly `size` raw bytes, any number of partial reads/writes  |
//! | status  | tag `R`/`D`/`F` (1) + length `u32` BE (4) + UTF-8 message     |
//! | ack     | the three bytes `ACK` (not itself acknowledged)               |
//!
//! The status unit separates "I received your command" (the ack) from "I
//! accept it and you may stream" ([`Status::Ready`]), so a rejected command
//! never leaves the peer sending a size and payload nobody expects.
//!
//! No unit is sent before the previous one has been acknowledged; a missing,
//! short, or wrong acknowledgment aborts the exchange.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::ProtocolError;

/// Command buffer size, payload chunk size and status message limit.
pub const BUFFER_SIZE: usize = 2048;

/// Acknowledgment token sent after every fully consumed unit.
pub const ACK_TOKEN: &[u8; 3] = b"ACK";

/// How long a sender waits for an acknowledgment by default.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Tag bytes of the status unit.
pub mod tag {
    /// Command accepted; the exchange continues with streamed units.
    pub const READY: u8 = b'R';
    /// Command completed.
    pub const DONE: u8 = b'D';
    /// Command refused or failed; the message is a diagnostic.
    pub const FAILED: u8 = b'F';
}

const STATUS_HEADER_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome reported by the responder for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready(String),
    Done(String),
    Failed(String),
}

impl Status {
    pub fn message(&self) -> &str {
        match self {
            Status::Ready(m) | Status::Done(m) | Status::Failed(m) => m,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Status::Ready(_) => tag::READY,
            Status::Done(_) => tag::DONE,
            Status::Failed(_) => tag::FAILED,
        }
    }

    /// Serialise into a status unit; messages longer than [`BUFFER_SIZE`]
    /// are cut at the last character boundary that fits.
    fn encode(&self) -> Vec<u8> {
        let message = truncate_utf8(self.message(), BUFFER_SIZE);
        let mut buf = Vec::with_capacity(STATUS_HEADER_LEN + message.len());
        buf.push(self.tag());
        buf.extend_from_slice(&(message.len() as u32).to_be_bytes());
        buf.extend_from_slice(message.as_bytes());
        buf
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ready(m) => write!(f, "ready ({m})"),
            Status::Done(m) => write!(f, "done ({m})"),
            Status::Failed(m) => write!(f, "failed ({m})"),
        }
    }
}

/// Longest prefix of `s` that is at most `max` bytes and valid UTF-8.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Role-agnostic send/receive primitives over one connection.
///
/// Both the responder ([`crate::session`]) and the initiator
/// ([`crate::client`]) drive the protocol through this type; the
/// coordinator uses it in both roles at once when relaying.
#[derive(Debug)]
pub struct Codec<S> {
    stream: S,
    ack_timeout: Duration,
}

impl<S> Codec<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, ack_timeout: Duration) -> Self {
        Self { stream, ack_timeout }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Flush and half-close the write side.
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Command unit
    // -----------------------------------------------------------------------

    /// Send a command line; lines longer than [`BUFFER_SIZE`] are truncated.
    pub async fn send_command(&mut self, line: &str) -> Result<(), ProtocolError> {
        let line = truncate_utf8(line, BUFFER_SIZE);
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        log::trace!("[codec] → command {line:?}");
        self.wait_for_ack().await
    }

    /// Receive one command line and acknowledge it.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.  The
    /// acknowledgment confirms receipt only; the command is not validated.
    pub async fn recv_command(&mut self) -> Result<Option<String>, ProtocolError> {
        let mut buf = [0u8; BUFFER_SIZE];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&buf[..n]).into_owned();
        log::trace!("[codec] ← command {line:?}");
        self.send_ack().await?;
        Ok(Some(line))
    }

    // -----------------------------------------------------------------------
    // Size unit
    // -----------------------------------------------------------------------

    pub async fn send_size(&mut self, size: u32) -> Result<(), ProtocolError> {
        self.stream.write_all(&size.to_be_bytes()).await?;
        self.stream.flush().await?;
        self.wait_for_ack().await
    }

    pub async fn recv_size(&mut self) -> Result<u32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.read_unit(&mut buf).await?;
        self.send_ack().await?;
        Ok(u32::from_be_bytes(buf))
    }

    // -----------------------------------------------------------------------
    // Payload unit
    // -----------------------------------------------------------------------

    /// Send an in-memory payload.  The matching size unit must precede it.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        log::trace!("[codec] → payload {} bytes", payload.len());
        self.wait_for_ack().await
    }

    /// Stream exactly `len` bytes from `source` as one payload unit,
    /// [`BUFFER_SIZE`] bytes at a time.
    pub async fn send_payload_from<R>(&mut self, source: &mut R, len: u32) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let expected = u64::from(len);
        let mut chunk = [0u8; BUFFER_SIZE];
        let mut sent: u64 = 0;
        while sent < expected {
            let want = (expected - sent).min(BUFFER_SIZE as u64) as usize;
            let n = source.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(ProtocolError::ShortSource { expected, read: sent });
            }
            self.stream.write_all(&chunk[..n]).await?;
            sent += n as u64;
        }
        self.stream.flush().await?;
        log::trace!("[codec] → payload {sent} bytes (streamed)");
        self.wait_for_ack().await
    }

    /// Receive exactly `size` payload bytes into a buffer of that size.
    ///
    /// A connection that closes early yields [`ProtocolError::Truncated`]
    /// and the partial buffer is dropped; nothing is acknowledged.
    pub async fn recv_payload(&mut self, size: u32) -> Result<Vec<u8>, ProtocolError> {
        let expected = size as usize;
        let mut buf = vec![0u8; expected];
        let mut received = 0usize;
        while received < expected {
            let end = (received + BUFFER_SIZE).min(expected);
            let n = self.stream.read(&mut buf[received..end]).await?;
            if n == 0 {
                return Err(ProtocolError::Truncated {
                    expected: size,
                    received: received as u32,
                });
            }
            received += n;
        }
        log::trace!("[codec] ← payload {received} bytes");
        self.send_ack().await?;
        Ok(buf)
    }

    // -----------------------------------------------------------------------
    // Status unit
    // -----------------------------------------------------------------------

    pub async fn send_status(&mut self, status: &Status) -> Result<(), ProtocolError> {
        self.stream.write_all(&status.encode()).await?;
        self.stream.flush().await?;
        log::trace!("[codec] → status {status}");
        self.wait_for_ack().await
    }

    pub async fn recv_status(&mut self) -> Result<Status, ProtocolError> {
        let mut header = [0u8; STATUS_HEADER_LEN];
        self.read_unit(&mut header).await?;
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if len as usize > BUFFER_SIZE {
            return Err(ProtocolError::OversizedStatus(len));
        }
        let mut message = vec![0u8; len as usize];
        self.read_unit(&mut message).await?;
        let message = String::from_utf8_lossy(&message).into_owned();

        let status = match header[0] {
            tag::READY => Status::Ready(message),
            tag::DONE => Status::Done(message),
            tag::FAILED => Status::Failed(message),
            other => return Err(ProtocolError::UnknownStatus(other)),
        };
        log::trace!("[codec] ← status {status}");
        self.send_ack().await?;
        Ok(status)
    }

    // -----------------------------------------------------------------------
    // Acknowledgments
    // -----------------------------------------------------------------------

    pub async fn send_ack(&mut self) -> Result<(), ProtocolError> {
        self.stream.write_all(ACK_TOKEN).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Block until the peer acknowledges the last unit, or fail.
    pub async fn wait_for_ack(&mut self) -> Result<(), ProtocolError> {
        let mut buf = [0u8; ACK_TOKEN.len()];
        match timeout(self.ack_timeout, self.stream.read_exact(&mut buf)).await {
            Err(_elapsed) => {
                log::warn!("[codec] no acknowledgment within {:?}", self.ack_timeout);
                Err(ProtocolError::AckTimeout(self.ack_timeout))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::Disconnected)
            }
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) if &buf == ACK_TOKEN => Ok(()),
            Ok(Ok(_)) => Err(ProtocolError::UnexpectedAck(buf.to_vec())),
        }
    }

    /// Fill `buf` completely; EOF part-way is a disconnect.
    async fn read_unit(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match self.stream.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::Disconnected)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    const TEST_TIMEOUT: Duration = Duration::from_millis(200);

    /// Two codecs joined by an in-memory pipe.  The small buffer forces
    /// payloads through many partial reads and writes.
    fn pair() -> (Codec<DuplexStream>, Codec<DuplexStream>) {
        let (a, b) = duplex(64);
        (Codec::new(a, TEST_TIMEOUT), Codec::new(b, TEST_TIMEOUT))
    }

    #[tokio::test]
    async fn command_is_acknowledged_on_receipt() {
        let (mut tx, mut rx) = pair();
        let receiver = tokio::spawn(async move { rx.recv_command().await.unwrap() });
        tx.send_command("dfile ~smain/a.c").await.unwrap();
        assert_eq!(receiver.await.unwrap().as_deref(), Some("dfile ~smain/a.c"));
    }

    #[tokio::test]
    async fn recv_command_returns_none_on_clean_close() {
        let (tx, mut rx) = pair();
        drop(tx);
        assert!(rx.recv_command().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overlong_command_is_truncated_to_the_buffer() {
        let (a, b) = duplex(4 * BUFFER_SIZE);
        let mut tx = Codec::new(a, TEST_TIMEOUT);
        let mut rx = Codec::new(b, TEST_TIMEOUT);
        let long = format!("display ~smain/{}", "x".repeat(3 * BUFFER_SIZE));
        let receiver = tokio::spawn(async move { rx.recv_command().await.unwrap().unwrap() });
        tx.send_command(&long).await.unwrap();
        let got = receiver.await.unwrap();
        assert_eq!(got.len(), BUFFER_SIZE);
        assert!(long.starts_with(&got));
    }

    #[tokio::test]
    async fn size_is_big_endian_on_the_wire() {
        let (a, mut raw) = duplex(64);
        let mut tx = Codec::new(a, TEST_TIMEOUT);
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            raw.read_exact(&mut buf).await.unwrap();
            raw.write_all(ACK_TOKEN).await.unwrap();
            buf
        });
        tx.send_size(0x0102_0304).await.unwrap();
        assert_eq!(peer.await.unwrap(), [0x01, 0x02, 0x03, 0x04]);
    }

    #[tokio::test]
    async fn size_and_payload_cross_many_partial_reads() {
        let (mut tx, mut rx) = pair();
        let data: Vec<u8> = (0..5 * BUFFER_SIZE + 17).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let receiver = tokio::spawn(async move {
            let size = rx.recv_size().await.unwrap();
            rx.recv_payload(size).await.unwrap()
        });
        tx.send_size(data.len() as u32).await.unwrap();
        tx.send_payload(&data).await.unwrap();

        assert_eq!(receiver.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn zero_length_payload_is_legal() {
        let (mut tx, mut rx) = pair();
        let receiver = tokio::spawn(async move {
            let size = rx.recv_size().await.unwrap();
            rx.recv_payload(size).await.unwrap()
        });
        tx.send_size(0).await.unwrap();
        tx.send_payload(&[]).await.unwrap();
        assert!(receiver.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn streamed_payload_matches_source() {
        let (mut tx, mut rx) = pair();
        let data = vec![7u8; 3 * BUFFER_SIZE - 1];
        let len = data.len() as u32;
        let receiver = tokio::spawn(async move { rx.recv_payload(len).await.unwrap() });
        let mut source = std::io::Cursor::new(data.clone());
        tx.send_payload_from(&mut source, len).await.unwrap();
        assert_eq!(receiver.await.unwrap(), data);
    }

    #[tokio::test]
    async fn short_source_aborts_the_send() {
        let (mut tx, _rx) = pair();
        let mut source = std::io::Cursor::new(vec![1u8; 10]);
        let err = tx.send_payload_from(&mut source, 20).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ShortSource { expected: 20, read: 10 }));
    }

    #[tokio::test]
    async fn early_close_truncates_the_payload() {
        let (mut raw, b) = duplex(64);
        let mut rx = Codec::new(b, TEST_TIMEOUT);
        raw.write_all(&[0u8; 10]).await.unwrap();
        drop(raw);
        let err = rx.recv_payload(100).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated { expected: 100, received: 10 }
        ));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut tx, _silent) = pair();
        let err = tx.send_command("display ~smain").await.unwrap_err();
        assert!(matches!(err, ProtocolError::AckTimeout(t) if t == TEST_TIMEOUT));
    }

    #[tokio::test]
    async fn wrong_ack_bytes_are_rejected() {
        let (a, mut raw) = duplex(64);
        let mut tx = Codec::new(a, TEST_TIMEOUT);
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            raw.read_exact(&mut buf).await.unwrap();
            raw.write_all(b"NAK").await.unwrap();
            raw
        });
        let err = tx.send_size(1).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedAck(ref b) if b == b"NAK"));
        drop(peer.await.unwrap());
    }

    #[tokio::test]
    async fn closed_peer_instead_of_ack_is_a_disconnect() {
        let (a, mut raw) = duplex(64);
        let mut tx = Codec::new(a, TEST_TIMEOUT);
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            raw.read_exact(&mut buf).await.unwrap();
            raw.write_all(b"A").await.unwrap();
        });
        let err = tx.send_size(9).await.unwrap_err();
        peer.await.unwrap();
        assert!(matches!(err, ProtocolError::Disconnected));
    }

    #[tokio::test]
    async fn status_round_trips_each_tag() {
        let (mut tx, mut rx) = pair();
        let statuses = vec![
            Status::Ready("notes.txt".into()),
            Status::Done(String::new()),
            Status::Failed("file ~smain/x.c does not exist".into()),
        ];
        let expected = statuses.clone();
        let receiver = tokio::spawn(async move {
            let mut got = Vec::new();
            for _ in 0..3 {
                got.push(rx.recv_status().await.unwrap());
            }
            got
        });
        for s in &statuses {
            tx.send_status(s).await.unwrap();
        }
        assert_eq!(receiver.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn long_status_messages_are_capped() {
        let (a, b) = duplex(4 * BUFFER_SIZE);
        let mut tx = Codec::new(a, TEST_TIMEOUT);
        let mut rx = Codec::new(b, TEST_TIMEOUT);
        let receiver = tokio::spawn(async move { rx.recv_status().await.unwrap() });
        tx.send_status(&Status::Failed("é".repeat(BUFFER_SIZE)))
            .await
            .unwrap();
        let got = receiver.await.unwrap();
        assert_eq!(got.message().len(), BUFFER_SIZE);
    }

    #[tokio::test]
    async fn unknown_status_tag_is_a_protocol_error() {
        let (mut raw, b) = duplex(64);
        let mut rx = Codec::new(b, TEST_TIMEOUT);
        raw.write_all(&[b'Z', 0, 0, 0, 0]).await.unwrap();
        let err = rx.recv_status().await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownStatus(b'Z')));
    }

    #[tokio::test]
    async fn oversized_status_length_is_refused() {
        let (mut raw, b) = duplex(64);
        let mut rx = Codec::new(b, TEST_TIMEOUT);
        let mut header = vec![tag::FAILED];
        header.extend_from_slice(&((BUFFER_SIZE as u32) + 1).to_be_bytes());
        raw.write_all(&header).await.unwrap();
        let err = rx.recv_status().await.unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedStatus(_)));
    }

    #[test]
    fn truncate_utf8_respects_char_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("héllo", 3), "hé");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }
}
