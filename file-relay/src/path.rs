//! Storage paths rooted at a node's storage root.
//!
//! Clients name locations with a tilde-rooted marker for the store, e.g.
//! `~/smain/docs`.  Four spellings are accepted and all normalise to the
//! same [`StoragePath`]:
//!
//! ```text
//!   ~smain        ~smain/docs
//!   ~/smain       ~/smain/docs
//! ```
//!
//! A [`StoragePath`] only ever holds normal segments: `.` and empty segments
//! are dropped and `..` pops, so a path that would climb above the root is
//! rejected before it can touch the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ValidationError;

/// A normalised path relative to a storage root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StoragePath {
    segments: Vec<String>,
}

impl StoragePath {
    /// The storage root itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a marker-prefixed path for the store called `store`.
    pub fn parse(text: &str, store: &str) -> Result<Self, ValidationError> {
        let rest = text
            .strip_prefix("~/")
            .and_then(|r| r.strip_prefix(store))
            .or_else(|| text.strip_prefix('~').and_then(|r| r.strip_prefix(store)));

        match rest {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => Self::from_relative(rest),
            _ => Err(ValidationError::BadDestination {
                path: text.to_string(),
                store: store.to_string(),
            }),
        }
    }

    /// Normalise a path that is already relative to the root.
    pub fn from_relative(rel: &str) -> Result<Self, ValidationError> {
        let mut segments: Vec<String> = Vec::new();
        for seg in rel.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(ValidationError::EscapesRoot(rel.to_string()));
                    }
                }
                s if s.contains('\0') => {
                    return Err(ValidationError::EscapesRoot(rel.to_string()));
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Append a single file name (anything before its final `/` is ignored).
    pub fn join(&self, name: &str) -> Result<Self, ValidationError> {
        let base = name.rsplit('/').next().unwrap_or(name);
        if matches!(base, "" | "." | "..") || base.contains('\0') {
            return Err(ValidationError::MissingFileName(name.to_string()));
        }
        let mut segments = self.segments.clone();
        segments.push(base.to_string());
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Absolute location of this path under `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }

    /// Canonical marker form for the store called `store`, used when the
    /// path is forwarded to another node.
    pub fn to_remote(&self, store: &str) -> String {
        if self.is_root() {
            format!("~/{store}")
        } else {
            format!("~/{store}/{self}")
        }
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
