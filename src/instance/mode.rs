use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AntError, Result};

/// How a mutating call is routed.
///
/// | mode      | apply to index | log target |
/// |-----------|----------------|------------|
/// | Normal    | yes            | primary    |
/// | Replay    | yes            | none       |
/// | Buffering | no             | buffer     |
///
/// The lock pair `(memory_lock, aof_lock)` is kept only as a view for
/// callers that speak in those terms; `(true, false)` has no mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Normal,
    Replay,
    Buffering,
}

impl WriteMode {
    pub fn from_locks(memory_lock: bool, aof_lock: bool) -> Result<Self> {
        match (memory_lock, aof_lock) {
            (false, false) => Ok(WriteMode::Normal),
            (false, true) => Ok(WriteMode::Replay),
            (true, true) => Ok(WriteMode::Buffering),
            (true, false) => Err(AntError::InvalidLockState {
                memory_lock,
                aof_lock,
            }),
        }
    }

    /// `(memory_lock, aof_lock)`.
    pub fn locks(&self) -> (bool, bool) {
        match self {
            WriteMode::Normal => (false, false),
            WriteMode::Replay => (false, true),
            WriteMode::Buffering => (true, true),
        }
    }

    pub fn applies_to_index(&self) -> bool {
        !self.locks().0
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::Normal => "normal",
            WriteMode::Replay => "replay",
            WriteMode::Buffering => "buffering",
        })
    }
}
