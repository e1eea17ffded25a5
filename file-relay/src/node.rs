//! Storage scope of one node and the routing decision for each class.
//!
//! Coordinator and backend stores run the same responder code; they differ
//! only in the [`Node`] they are given:
//!
//! | Role        | Local class | Relayed classes |
//! |-------------|-------------|-----------------|
//! | coordinator | `.c`        | `.txt`, `.pdf`  |
//! | text store  | `.txt`      | none            |
//! | pdf store   | `.pdf`      | none            |
//!
//! Validation helpers (`check_*`) run before any payload is exchanged; the
//! operations (`put`, `get`, …) then either touch the local [`Store`] or go
//! through the [`Relay`].

use std::time::Duration;

use crate::classify::FileClass;
use crate::client::Fetched;
use crate::config::{NodeConfig, Role};
use crate::error::{Error, ValidationError};
use crate::path::StoragePath;
use crate::relay::Relay;
use crate::store::Store;

/// Where files of a class live from this node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Local,
    Relayed,
}

/// Shared, immutable per-node state handed to every session.
#[derive(Debug)]
pub struct Node {
    role: Role,
    store: Store,
    relay: Relay,
    ack_timeout: Duration,
}

impl Node {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            role: config.role,
            store: Store::new(config.root.clone()),
            relay: Relay::new(config.peers.clone(), config.ack_timeout, config.connect_timeout),
            ack_timeout: config.ack_timeout,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Acknowledgment timeout for sessions accepted by this node.
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Storage-root marker clients must use with this node.
    pub fn store_name(&self) -> &'static str {
        self.role.store_name()
    }

    pub fn local_class(&self) -> FileClass {
        self.role.local_class()
    }

    pub fn route(&self, class: FileClass) -> Result<Route, ValidationError> {
        if class == self.local_class() {
            Ok(Route::Local)
        } else if class.is_supported() && self.relay.handles(class) {
            Ok(Route::Relayed)
        } else {
            Err(ValidationError::NoStore(class))
        }
    }

    // -----------------------------------------------------------------------
    // Validation (before streaming)
    // -----------------------------------------------------------------------

    /// Validate an upload and return its class, target directory and base
    /// file name.
    pub fn check_upload(
        &self,
        filename: &str,
        destination: &str,
    ) -> Result<(FileClass, StoragePath, String), ValidationError> {
        let dir = StoragePath::parse(destination, self.store_name())?;
        let target = dir.join(filename)?;
        let name = target.file_name().unwrap_or_default().to_string();
        let class = FileClass::of(&name);
        if !class.is_supported() {
            return Err(ValidationError::UnsupportedExtension(name));
        }
        self.route(class)?;
        Ok((class, dir, name))
    }

    /// Validate a path naming one stored file.
    pub fn check_file(&self, text: &str) -> Result<(FileClass, StoragePath), ValidationError> {
        let path = StoragePath::parse(text, self.store_name())?;
        let name = path
            .file_name()
            .ok_or_else(|| ValidationError::MissingFileName(text.to_string()))?;
        let class = FileClass::of(name);
        if !class.is_supported() {
            return Err(ValidationError::UnsupportedExtension(name.to_string()));
        }
        self.route(class)?;
        Ok((class, path))
    }

    pub fn check_archive(&self, marker: &str) -> Result<FileClass, ValidationError> {
        let class = FileClass::from_marker(marker);
        if !class.is_supported() {
            return Err(ValidationError::UnsupportedExtension(marker.to_string()));
        }
        self.route(class)?;
        Ok(class)
    }

    pub fn check_dir(&self, text: &str) -> Result<StoragePath, ValidationError> {
        StoragePath::parse(text, self.store_name())
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    pub async fn put(
        &self,
        class: FileClass,
        dir: &StoragePath,
        name: &str,
        payload: Vec<u8>,
    ) -> Result<String, Error> {
        match self.route(class)? {
            Route::Local => {
                let target = dir.join(name)?;
                self.store.write(&target, &payload).await?;
                Ok(format!("stored {target}"))
            }
            Route::Relayed => self.relay.upload(class, name, dir, &payload).await,
        }
    }

    pub async fn get(&self, class: FileClass, path: &StoragePath) -> Result<Fetched, Error> {
        match self.route(class)? {
            Route::Local => {
                let bytes = self.store.read(path).await?;
                let name = path.file_name().unwrap_or_default().to_string();
                Ok(Fetched { name, bytes })
            }
            Route::Relayed => self.relay.download(class, path).await,
        }
    }

    pub async fn remove(&self, class: FileClass, path: &StoragePath) -> Result<String, Error> {
        match self.route(class)? {
            Route::Local => {
                self.store.delete(path).await?;
                Ok(format!("removed {path}"))
            }
            Route::Relayed => self.relay.delete(class, path).await,
        }
    }

    /// All files of `class`, packed on the node that owns them.
    pub async fn archive(&self, class: FileClass) -> Result<Fetched, Error> {
        let name = class.archive_name().unwrap_or("files.tar").to_string();
        match self.route(class)? {
            Route::Local => Ok(Fetched {
                name,
                bytes: self.store.archive(class).await?,
            }),
            Route::Relayed => {
                let fetched = self.relay.archive(class).await?;
                Ok(Fetched { name, ..fetched })
            }
        }
    }

    /// Merged listing of `dir` across the local store and every relayed
    /// store, grouped by class in [`FileClass::STORED`] order.
    pub async fn list(&self, dir: &StoragePath) -> Result<Vec<String>, Error> {
        let mut entries = Vec::new();
        for class in FileClass::STORED {
            match self.route(class) {
                Ok(Route::Local) => entries.extend(self.store.list(dir, class).await?),
                Ok(Route::Relayed) => entries.extend(self.relay.list(class, dir).await?),
                Err(_) => {}
            }
        }
        Ok(entries)
    }
}
