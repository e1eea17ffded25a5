//! Error taxonomy shared by every role.
//!
//! - [`ProtocolError`]: the byte stream itself misbehaved (ack timeout,
//!   desync, disconnect).  Terminal for the connection, except for
//!   [`ProtocolError::MalformedCommand`], which is answered with a diagnostic.
//! - [`ValidationError`]: a well-formed request that cannot be honoured
//!   (bad extension, bad destination, missing file).  Reported to the peer;
//!   the session keeps going.
//! - [`Error::Io`]: local filesystem failure.  Reported, never fatal.
//! - [`Error::Upstream`]: a backend store relay failed or refused.
//! - [`Error::Rejected`]: the peer answered a command with a failure status.

use std::time::Duration;

use thiserror::Error;

use crate::classify::FileClass;

/// Failures of the transfer protocol on one connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("no acknowledgment received within {0:?}")]
    AckTimeout(Duration),
    #[error("unexpected acknowledgment bytes {0:?}")]
    UnexpectedAck(Vec<u8>),
    #[error("peer disconnected")]
    Disconnected,
    #[error("payload truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u32, received: u32 },
    #[error("payload source ended after {read} of {expected} bytes")]
    ShortSource { expected: u64, read: u64 },
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("unknown status tag {0:#04x}")]
    UnknownStatus(u8),
    #[error("status message of {0} bytes exceeds the message limit")]
    OversizedStatus(u32),
    #[error("unexpected status: {0}")]
    UnexpectedStatus(String),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Requests that are well-formed on the wire but cannot be honoured.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported file type: {0} (only .c, .txt and .pdf are allowed)")]
    UnsupportedExtension(String),
    #[error("invalid destination path {path}: must start with ~{store} or ~/{store}")]
    BadDestination { path: String, store: String },
    #[error("path {0} escapes the storage root")]
    EscapesRoot(String),
    #[error("no file name in {0}")]
    MissingFileName(String),
    #[error("file {0} does not exist")]
    NotFound(String),
    #[error("file {path} is {size} bytes, larger than the protocol limit")]
    TooLarge { path: String, size: u64 },
    #[error("this node has no store for {0} files")]
    NoStore(FileClass),
}

/// Top-level error returned by sessions, stores, clients and relays.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{class} store failed: {reason}")]
    Upstream { class: FileClass, reason: String },
    #[error("rejected by peer: {0}")]
    Rejected(String),
}

impl Error {
    /// Whether the connection this error happened on can no longer be used.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Protocol(e) if !matches!(e, ProtocolError::MalformedCommand(_)))
    }
}
