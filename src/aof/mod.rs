//! Append-only operation log.
//!
//! Every mutating call is recorded as one text line
//! `timestamp \t COMMAND \t ref [\t ref ...]` whose refs point at content
//! files holding the vectors and ids. A version directory carries two logs
//! with the same format: the primary log and the buffer log.

pub mod content;
pub mod reader;
pub mod writer;

use std::fmt;
use std::str::FromStr;

use crate::types::VectorId;

use content::{ContentArray, ContentRef};

pub use reader::AofReader;
pub use writer::AofWriter;

/// Timestamp format of the first column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Build,
    Insert,
    Update,
    Remove,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Build => "BUILD",
            Command::Insert => "INSERT",
            Command::Update => "UPDATE",
            Command::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUILD" => Ok(Command::Build),
            "INSERT" => Ok(Command::Insert),
            "UPDATE" => Ok(Command::Update),
            "REMOVE" => Ok(Command::Remove),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Which of the two logs of a version a record goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Primary,
    Buffer,
}

impl LogTarget {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            LogTarget::Primary => "primary",
            LogTarget::Buffer => "buffer",
        }
    }
}

/// A mutating operation together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Build {
        vectors: Vec<Vec<f32>>,
        ids: Vec<VectorId>,
    },
    Insert {
        vectors: Vec<Vec<f32>>,
        ids: Vec<VectorId>,
    },
    Update {
        vectors: Vec<Vec<f32>>,
        ids: Vec<VectorId>,
    },
    Remove {
        ids: Vec<VectorId>,
    },
}

impl Operation {
    pub fn command(&self) -> Command {
        match self {
            Operation::Build { .. } => Command::Build,
            Operation::Insert { .. } => Command::Insert,
            Operation::Update { .. } => Command::Update,
            Operation::Remove { .. } => Command::Remove,
        }
    }

    pub fn ids(&self) -> &[VectorId] {
        match self {
            Operation::Build { ids, .. }
            | Operation::Insert { ids, .. }
            | Operation::Update { ids, .. }
            | Operation::Remove { ids } => ids,
        }
    }

    /// Payload arrays in log order: vectors first, then ids.
    pub(crate) fn arrays(&self) -> Vec<ContentRef<'_>> {
        match self {
            Operation::Build { vectors, ids }
            | Operation::Insert { vectors, ids }
            | Operation::Update { vectors, ids } => {
                vec![ContentRef::Vectors(vectors), ContentRef::Ids(ids)]
            }
            Operation::Remove { ids } => vec![ContentRef::Ids(ids)],
        }
    }

    /// Rebuild an operation from a command and its decoded arrays.
    pub(crate) fn from_arrays(
        command: Command,
        arrays: Vec<ContentArray>,
    ) -> Result<Self, String> {
        let mut arrays = arrays.into_iter();
        let op = match command {
            Command::Remove => match arrays.next() {
                Some(ContentArray::Ids(ids)) => Operation::Remove { ids },
                other => return Err(unexpected(command, "ids", other.as_ref())),
            },
            Command::Build | Command::Insert | Command::Update => {
                let vectors = match arrays.next() {
                    Some(ContentArray::Vectors(v)) => v,
                    other => return Err(unexpected(command, "vectors", other.as_ref())),
                };
                let ids = match arrays.next() {
                    Some(ContentArray::Ids(ids)) => ids,
                    other => return Err(unexpected(command, "ids", other.as_ref())),
                };
                match command {
                    Command::Build => Operation::Build { vectors, ids },
                    Command::Insert => Operation::Insert { vectors, ids },
                    _ => Operation::Update { vectors, ids },
                }
            }
        };
        if arrays.next().is_some() {
            return Err(format!("{command} record carries extra content references"));
        }
        Ok(op)
    }
}

fn unexpected(command: Command, wanted: &str, found: Option<&ContentArray>) -> String {
    match found {
        Some(array) => format!("{command} expected {wanted} array, found {}", array.kind()),
        None => format!("{command} is missing its {wanted} array"),
    }
}

/// One parsed log line. `command` is kept raw so unknown commands can be
/// reported and skipped by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AofRecord {
    pub timestamp: String,
    pub command: String,
    pub refs: Vec<String>,
}

impl AofRecord {
    pub fn to_line(&self) -> String {
        let mut line = format!("{}\t{}", self.timestamp, self.command);
        for r in &self.refs {
            line.push('\t');
            line.push_str(r);
        }
        line.push('\n');
        line
    }

    /// Parse one line (without its trailing newline).
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut fields = line.split('\t');
        let timestamp = match fields.next() {
            Some(ts) if !ts.is_empty() => ts.to_string(),
            _ => return Err("missing timestamp".into()),
        };
        let command = match fields.next() {
            Some(cmd) if !cmd.is_empty() => cmd.to_string(),
            _ => return Err("missing command".into()),
        };
        let refs: Vec<String> = fields.map(str::to_string).collect();
        if refs.is_empty() || refs.iter().any(|r| r.is_empty()) {
            return Err("missing or empty content reference".into());
        }
        Ok(Self {
            timestamp,
            command,
            refs,
        })
    }
}
