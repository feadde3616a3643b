use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-level identifier correlating records to one connection.
///
/// Several records may share a session id; the registry resolves an id to
/// the most recently added record for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(raw: u64) -> Self {
        SessionId(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// Purpose of a cell query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellRole {
    #[default]
    Display,
    Tooltip,
}

/// Interaction flags reported for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemFlags {
    pub enabled: bool,
    pub selectable: bool,
}

impl ItemFlags {
    /// Valid row: fully interactive.
    pub const INTERACTIVE: ItemFlags = ItemFlags {
        enabled: true,
        selectable: true,
    };

    /// Invalid row position: enabled but not interactive.
    pub const INERT: ItemFlags = ItemFlags {
        enabled: true,
        selectable: false,
    };

    pub fn is_interactive(&self) -> bool {
        self.enabled && self.selectable
    }
}
