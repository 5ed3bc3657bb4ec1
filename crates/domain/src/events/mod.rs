//! Domain events
//!
//! Emitted whenever apparent read-state changes for any id: a local mutation,
//! a flush confirmation clearing the pending flag, a server-merge adoption, or
//! an explicit reset. Independent UI surfaces subscribe to these through the
//! sync bus to stay consistent without polling the store.

use serde::{Deserialize, Serialize};

/// Event describing a visible read-state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ReadStateEvent {
    /// A local "mark as read" was applied optimistically
    Marked { id: String },
    /// A flush succeeded and these ids are no longer pending
    Confirmed { ids: Vec<String> },
    /// A settled entry adopted a differing authoritative server value
    Adopted { id: String, is_read: bool },
    /// An entry was explicitly reset (item recreated as unread)
    Reset { id: String },
}

impl ReadStateEvent {
    /// Ids whose apparent state this event touches.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            ReadStateEvent::Marked { id }
            | ReadStateEvent::Adopted { id, .. }
            | ReadStateEvent::Reset { id } => vec![id.as_str()],
            ReadStateEvent::Confirmed { ids } => ids.iter().map(String::as_str).collect(),
        }
    }
}
