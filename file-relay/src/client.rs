//! Initiator side of the protocol.
//!
//! A [`Client`] sends one command at a time and waits for every
//! acknowledgment and status before moving on.  It is used in two places:
//! by end users talking to the coordinator, and by the coordinator itself
//! talking to a backend store (see [`crate::relay`]).
//!
//! Paths are always rendered in the canonical `~/<store>/...` form of the
//! store this client talks to.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::classify::FileClass;
use crate::codec::{Codec, Status};
use crate::command::Command;
use crate::error::{Error, ProtocolError, ValidationError};
use crate::path::StoragePath;

/// A file or archive fetched from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One initiator connection.
#[derive(Debug)]
pub struct Client<S> {
    codec: Codec<S>,
    store: String,
}

impl Client<TcpStream> {
    /// Connect to the node that owns the storage root `store`.
    pub async fn connect(
        addr: SocketAddr,
        store: &str,
        ack_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, Error> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream.map_err(ProtocolError::from)?,
            Err(_elapsed) => {
                return Err(ProtocolError::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {addr} timed out"),
                ))
                .into());
            }
        };
        stream.set_nodelay(true).map_err(ProtocolError::from)?;
        log::debug!("[client] connected to {addr} ({store})");
        Ok(Self::new(stream, store, ack_timeout))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, store: &str, ack_timeout: Duration) -> Self {
        Self {
            codec: Codec::new(stream, ack_timeout),
            store: store.to_string(),
        }
    }

    /// Name of the storage root the peer owns, e.g. `smain`.
    pub fn store(&self) -> &str {
        &self.store
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.codec.shutdown().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    /// Upload a local file into the destination directory `destination`.
    ///
    /// The extension, destination and local file are all checked before the
    /// first byte is written to the connection.  The file is sized from its
    /// metadata and streamed, never read into memory whole.
    pub async fn upload_file(&mut self, local: &Path, destination: &str) -> Result<String, Error> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ValidationError::MissingFileName(local.display().to_string()))?;
        if !FileClass::of(&name).is_supported() {
            return Err(ValidationError::UnsupportedExtension(name).into());
        }
        let dir = StoragePath::parse(destination, &self.store)?;

        let meta = match tokio::fs::metadata(local).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(ValidationError::NotFound(local.display().to_string()).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ValidationError::NotFound(local.display().to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        let size = u32::try_from(meta.len()).map_err(|_| ValidationError::TooLarge {
            path: local.display().to_string(),
            size: meta.len(),
        })?;
        let mut file = tokio::fs::File::open(local).await?;

        self.request(&Command::Upload {
            filename: name,
            destination: dir.to_remote(&self.store),
        })
        .await?;
        self.expect_ready().await?;
        self.codec.send_size(size).await?;
        self.codec.send_payload_from(&mut file, size).await?;
        self.expect_done().await
    }

    /// Upload an in-memory payload as `filename` inside `dir`.
    pub async fn upload_bytes(
        &mut self,
        filename: &str,
        dir: &StoragePath,
        bytes: &[u8],
    ) -> Result<String, Error> {
        let size = u32::try_from(bytes.len()).map_err(|_| ValidationError::TooLarge {
            path: filename.to_string(),
            size: bytes.len() as u64,
        })?;
        self.request(&Command::Upload {
            filename: filename.to_string(),
            destination: dir.to_remote(&self.store),
        })
        .await?;
        self.expect_ready().await?;
        self.codec.send_size(size).await?;
        self.codec.send_payload(bytes).await?;
        self.expect_done().await
    }

    // -----------------------------------------------------------------------
    // Download / delete / archive / list
    // -----------------------------------------------------------------------

    pub async fn download(&mut self, path: &StoragePath) -> Result<Fetched, Error> {
        self.request(&Command::Download {
            path: path.to_remote(&self.store),
        })
        .await?;
        let announced = self.expect_ready().await?;
        let bytes = self.recv_sized().await?;
        let name = if announced.is_empty() {
            path.file_name().unwrap_or_default().to_string()
        } else {
            announced
        };
        Ok(Fetched { name, bytes })
    }

    pub async fn delete(&mut self, path: &StoragePath) -> Result<String, Error> {
        self.request(&Command::Delete {
            path: path.to_remote(&self.store),
        })
        .await?;
        self.expect_done().await
    }

    /// Fetch every file of `class` as one tar archive.
    pub async fn archive(&mut self, class: FileClass) -> Result<Fetched, Error> {
        let marker = class
            .extension()
            .ok_or_else(|| ValidationError::UnsupportedExtension(class.to_string()))?;
        self.request(&Command::Archive {
            marker: marker.to_string(),
        })
        .await?;
        let announced = self.expect_ready().await?;
        let bytes = self.recv_sized().await?;
        let name = if announced.is_empty() {
            class.archive_name().unwrap_or("files.tar").to_string()
        } else {
            announced
        };
        Ok(Fetched { name, bytes })
    }

    /// Root-relative paths of all files at or below `dir`.
    pub async fn list(&mut self, dir: &StoragePath) -> Result<Vec<String>, Error> {
        self.request(&Command::List {
            path: dir.to_remote(&self.store),
        })
        .await?;
        self.expect_ready().await?;
        let bytes = self.recv_sized().await?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn request(&mut self, command: &Command) -> Result<(), Error> {
        log::debug!("[client] → {command}");
        self.codec.send_command(&command.to_string()).await?;
        Ok(())
    }

    async fn expect_ready(&mut self) -> Result<String, Error> {
        match self.codec.recv_status().await? {
            Status::Ready(m) => Ok(m),
            Status::Failed(m) => Err(Error::Rejected(m)),
            other => Err(ProtocolError::UnexpectedStatus(other.to_string()).into()),
        }
    }

    async fn expect_done(&mut self) -> Result<String, Error> {
        match self.codec.recv_status().await? {
            Status::Done(m) => Ok(m),
            Status::Failed(m) => Err(Error::Rejected(m)),
            other => Err(ProtocolError::UnexpectedStatus(other.to_string()).into()),
        }
    }

    async fn recv_sized(&mut self) -> Result<Vec<u8>, Error> {
        let size = self.codec.recv_size().await?;
        Ok(self.codec.recv_payload(size).await?)
    }
}
