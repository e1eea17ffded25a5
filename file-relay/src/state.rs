//! Session finite-state machine types.
//!
//! Every accepted connection is driven through the states below by
//! [`crate::session::Session`].  Transitions happen there; this module only
//! names the states so they can be logged and asserted on.
//!
//! ```text
//!                 ┌───────────────────────────────────────────────┐
//!                 ▼                                               │
//!  AWAITING_COMMAND ──line──▶ PARSING_COMMAND ──▶ UPLOADING ──────┤
//!        │                          │         ──▶ DOWNLOADING ────┤
//!        │ peer closed              │         ──▶ DELETING ───────┤
//!        ▼                          │         ──▶ ARCHIVING ──────┤
//!      CLOSED ◀── protocol error ───┘         ──▶ LISTING ────────┘
//! ```
//!
//! A malformed or refused command goes straight from `ParsingCommand` back
//! to `AwaitingCommand` after the diagnostic is sent.

use crate::command::Command;

/// All possible states of one responder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the next command line; initial state.
    #[default]
    AwaitingCommand,
    /// A line arrived and was acknowledged; it is being parsed and checked.
    ParsingCommand,
    /// Receiving a file and storing or relaying it.
    Uploading,
    /// Fetching a file and streaming it back.
    Downloading,
    /// Removing a file locally or on the owning store.
    Deleting,
    /// Building or relaying a whole-class archive.
    Archiving,
    /// Collecting and merging listings.
    Listing,
    /// The peer disconnected or the stream became unusable.
    Closed,
}

impl SessionState {
    /// State that handles `command` once it has been parsed.
    pub fn for_command(command: &Command) -> Self {
        match command {
            Command::Upload { .. } => Self::Uploading,
            Command::Download { .. } => Self::Downloading,
            Command::Delete { .. } => Self::Deleting,
            Command::Archive { .. } => Self::Archiving,
            Command::List { .. } => Self::Listing,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
