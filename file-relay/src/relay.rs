//! Forwarding of non-local file classes to their backend stores.
//!
//! The coordinator owns no bytes for `.txt` or `.pdf` files.  For those it
//! acts as an initiator: each operation opens one fresh connection to the
//! owning store, replays the command with the path rewritten to that store's
//! root marker, and closes the connection when the exchange is over.
//!
//! ```text
//!  client ──ufile notes.txt ~/smain/docs──▶ coordinator
//!                                               │ class = text
//!                                               ▼
//!                         text store ◀──ufile notes.txt ~/stext/docs──
//! ```
//!
//! Any failure on the backend leg, including a refusal by the store, is
//! reported as [`Error::Upstream`] so the client sees which store failed.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::classify::FileClass;
use crate::client::{Client, Fetched};
use crate::error::{Error, ValidationError};
use crate::path::StoragePath;

/// Addresses of the backend stores, keyed by the class each one owns.
#[derive(Debug, Clone)]
pub struct Relay {
    peers: BTreeMap<FileClass, SocketAddr>,
    ack_timeout: Duration,
    connect_timeout: Duration,
}

impl Relay {
    pub fn new(
        peers: BTreeMap<FileClass, SocketAddr>,
        ack_timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            peers,
            ack_timeout,
            connect_timeout,
        }
    }

    pub fn handles(&self, class: FileClass) -> bool {
        self.peers.contains_key(&class)
    }

    pub async fn upload(
        &self,
        class: FileClass,
        filename: &str,
        dir: &StoragePath,
        bytes: &[u8],
    ) -> Result<String, Error> {
        let result = async {
            let mut store = self.open(class).await?;
            let done = store.upload_bytes(filename, dir, bytes).await?;
            store.shutdown().await?;
            Ok::<_, Error>(done)
        }
        .await;
        log::info!("[relay] upload {dir}/{filename} ({} bytes) → {class} store", bytes.len());
        upstream(class, result)
    }

    pub async fn download(&self, class: FileClass, path: &StoragePath) -> Result<Fetched, Error> {
        let result = async {
            let mut store = self.open(class).await?;
            let fetched = store.download(path).await?;
            store.shutdown().await?;
            Ok::<_, Error>(fetched)
        }
        .await;
        log::info!("[relay] download {path} ← {class} store");
        upstream(class, result)
    }

    pub async fn delete(&self, class: FileClass, path: &StoragePath) -> Result<String, Error> {
        let result = async {
            let mut store = self.open(class).await?;
            let done = store.delete(path).await?;
            store.shutdown().await?;
            Ok::<_, Error>(done)
        }
        .await;
        log::info!("[relay] delete {path} → {class} store");
        upstream(class, result)
    }

    pub async fn archive(&self, class: FileClass) -> Result<Fetched, Error> {
        let result = async {
            let mut store = self.open(class).await?;
            let fetched = store.archive(class).await?;
            store.shutdown().await?;
            Ok::<_, Error>(fetched)
        }
        .await;
        log::info!("[relay] archive of {class} files ← {class} store");
        upstream(class, result)
    }

    pub async fn list(&self, class: FileClass, dir: &StoragePath) -> Result<Vec<String>, Error> {
        let result = async {
            let mut store = self.open(class).await?;
            let entries = store.list(dir).await?;
            store.shutdown().await?;
            Ok::<_, Error>(entries)
        }
        .await;
        upstream(class, result)
    }

    async fn open(&self, class: FileClass) -> Result<Client<TcpStream>, Error> {
        let addr = self
            .peers
            .get(&class)
            .copied()
            .ok_or(ValidationError::NoStore(class))?;
        let store = class
            .store_name()
            .ok_or(ValidationError::NoStore(class))?;
        Client::connect(addr, store, self.ack_timeout, self.connect_timeout).await
    }
}

/// Attribute a backend-leg failure to the store that caused it.
fn upstream<T>(class: FileClass, result: Result<T, Error>) -> Result<T, Error> {
    result.map_err(|e| {
        let reason = match e {
            Error::Rejected(message) => message,
            other => other.to_string(),
        };
        log::warn!("[relay] {class} store failed: {reason}");
        Error::Upstream { class, reason }
    })
}
