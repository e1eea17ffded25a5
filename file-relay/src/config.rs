//! Startup configuration.
//!
//! Everything a node or client needs is resolved once (from CLI flags and
//! environment variables in `main.rs`) into the plain structs below and
//! passed down explicitly; nothing in the library reads global state.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::classify::FileClass;
use crate::codec::DEFAULT_ACK_TIMEOUT;

/// Default port of the coordinator (`smain`).
pub const COORDINATOR_PORT: u16 = 41581;
/// Default port of the text store (`stext`).
pub const TEXT_STORE_PORT: u16 = 51238;
/// Default port of the pdf store (`spdf`).
pub const PDF_STORE_PORT: u16 = 39462;

/// Time allowed to open a connection to a backend store.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which part of the storage hierarchy a node owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client-facing node; stores `.c` files and relays the rest.
    Coordinator,
    /// Backend owning `.txt` files.
    TextStore,
    /// Backend owning `.pdf` files.
    PdfStore,
}

impl Role {
    pub fn local_class(self) -> FileClass {
        match self {
            Role::Coordinator => FileClass::Source,
            Role::TextStore => FileClass::Text,
            Role::PdfStore => FileClass::Pdf,
        }
    }

    /// Storage-root marker name, e.g. `smain` for `~/smain`.
    pub fn store_name(self) -> &'static str {
        match self {
            Role::Coordinator => "smain",
            Role::TextStore => "stext",
            Role::PdfStore => "spdf",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Role::Coordinator => COORDINATOR_PORT,
            Role::TextStore => TEXT_STORE_PORT,
            Role::PdfStore => PDF_STORE_PORT,
        }
    }

    pub fn default_listen(self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.default_port())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::TextStore => write!(f, "text store"),
            Role::PdfStore => write!(f, "pdf store"),
        }
    }
}

/// `$HOME/<store-name>`, or `None` when no home directory is known.
pub fn default_root(role: Role) -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(role.store_name()))
}

/// Configuration of one storage node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: Role,
    pub listen: SocketAddr,
    pub root: PathBuf,
    /// Backend stores this node relays to, by the class they own.
    pub peers: BTreeMap<FileClass, SocketAddr>,
    pub ack_timeout: Duration,
    pub connect_timeout: Duration,
}

impl NodeConfig {
    /// A coordinator relaying `.txt` to `text` and `.pdf` to `pdf`.
    pub fn coordinator(listen: SocketAddr, root: PathBuf, text: SocketAddr, pdf: SocketAddr) -> Self {
        let mut peers = BTreeMap::new();
        peers.insert(FileClass::Text, text);
        peers.insert(FileClass::Pdf, pdf);
        Self {
            role: Role::Coordinator,
            listen,
            root,
            peers,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// A backend store with no peers of its own.
    pub fn store(role: Role, listen: SocketAddr, root: PathBuf) -> Self {
        Self {
            role,
            listen,
            root,
            peers: BTreeMap::new(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Configuration of the interactive client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub ack_timeout: Duration,
    pub connect_timeout: Duration,
    /// Where downloaded files and archives are saved.
    pub download_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(server: SocketAddr, download_dir: PathBuf) -> Self {
        Self {
            server,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            download_dir,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}
