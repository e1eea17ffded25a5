//! `file-relay` - a small distributed file store over plain TCP.
//!
//! # Architecture
//!
//! ```text
//!                ufile / dfile / rmfile / dtar / display
//!  ┌──────────┐  ───────────────────────────────────────▶  ┌──────────────┐
//!  │  Client  │                                            │ Coordinator  │ ~/smain  (.c)
//!  └──────────┘  ◀───────────────────────────────────────  │   (smain)    │
//!                                                          └──────┬───────┘
//!                                        relays .txt / .pdf       │
//!                                  ┌──────────────────────────────┴──┐
//!                           ┌──────▼──────┐                   ┌──────▼──────┐
//!                           │ Text store  │ ~/stext (.txt)    │  Pdf store  │ ~/spdf (.pdf)
//!                           │  (stext)    │                   │   (spdf)    │
//!                           └─────────────┘                   └─────────────┘
//! ```
//!
//! Every hop speaks the same acknowledgment-gated unit protocol, so the
//! coordinator talks to a backend store exactly as an end user talks to
//! the coordinator.
//!
//! Each module has a single responsibility:
//! - [`codec`]    - unit framing and acknowledgments
//! - [`command`]  - command line grammar
//! - [`classify`] - file-type classification by extension
//! - [`path`]     - `~store/...` paths confined to a storage root
//! - [`store`]    - local filesystem operations under one root
//! - [`relay`]    - forwarding of non-local classes to backend stores
//! - [`node`]     - per-node routing of a class to local storage or a relay
//! - [`session`]  - responder side of one connection
//! - [`state`]    - session finite-state machine types
//! - [`server`]   - accept loop, one task per connection
//! - [`client`]   - initiator side of one connection
//! - [`repl`]     - interactive line client
//! - [`config`]   - startup configuration
//! - [`error`]    - error types

pub mod classify;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod node;
pub mod path;
pub mod relay;
pub mod repl;
pub mod server;
pub mod session;
pub mod state;
pub mod store;

pub use classify::FileClass;
pub use client::{Client, Fetched};
pub use config::{ClientConfig, NodeConfig, Role};
pub use error::{Error, ProtocolError, ValidationError};
pub use node::Node;
pub use path::StoragePath;
