//! Client command vocabulary.
//!
//! One command is one whitespace-delimited text line with a case-sensitive
//! keyword:
//!
//! ```text
//! ufile   <filename> <destination-path>
//! dfile   <path>
//! rmfile  <path>
//! dtar    <filetype-marker>
//! display <path>
//! ```
//!
//! Parsing only checks shape (keyword and argument count).  Whether a path
//! names something this node may touch is decided by the session, because
//! that depends on the node's storage scope.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload { filename: String, destination: String },
    Download { path: String },
    Delete { path: String },
    Archive { marker: String },
    List { path: String },
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Upload { .. } => "ufile",
            Command::Download { .. } => "dfile",
            Command::Delete { .. } => "rmfile",
            Command::Archive { .. } => "dtar",
            Command::List { .. } => "display",
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let keyword = words
            .next()
            .ok_or_else(|| ProtocolError::MalformedCommand("empty command".into()))?;
        let args: Vec<&str> = words.collect();

        let expect = |n: usize, usage: &str| -> Result<(), ProtocolError> {
            if args.len() == n {
                Ok(())
            } else {
                Err(ProtocolError::MalformedCommand(format!("usage: {usage}")))
            }
        };

        match keyword {
            "ufile" => {
                expect(2, "ufile <filename> <destination-path>")?;
                Ok(Command::Upload {
                    filename: args[0].to_string(),
                    destination: args[1].to_string(),
                })
            }
            "dfile" => {
                expect(1, "dfile <path>")?;
                Ok(Command::Download { path: args[0].to_string() })
            }
            "rmfile" => {
                expect(1, "rmfile <path>")?;
                Ok(Command::Delete { path: args[0].to_string() })
            }
            "dtar" => {
                expect(1, "dtar <.c|.txt|.pdf>")?;
                Ok(Command::Archive { marker: args[0].to_string() })
            }
            "display" => {
                expect(1, "display <path>")?;
                Ok(Command::List { path: args[0].to_string() })
            }
            other => Err(ProtocolError::MalformedCommand(format!(
                "unknown command {other:?}"
            ))),
        }
    }
}

/// Renders the wire form of the command.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.keyword();
        match self {
            Command::Upload { filename, destination } => {
                write!(f, "{keyword} {filename} {destination}")
            }
            Command::Download { path } | Command::Delete { path } | Command::List { path } => {
                write!(f, "{keyword} {path}")
            }
            Command::Archive { marker } => write!(f, "{keyword} {marker}"),
        }
    }
}
