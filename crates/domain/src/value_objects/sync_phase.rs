//! Sync phase value object
//!
//! Per-entry lifecycle: `Unknown -> OptimisticPending -> Confirmed`, with a
//! re-entrant `Confirmed -> OptimisticPending` edge on a new local mutation.
//! A pending entry only ever becomes confirmed (flush success) or stays
//! pending (flush failure, retried) - it never returns to unknown except
//! through an explicit reset, which removes the entry altogether.

use serde::{Deserialize, Serialize};

/// Where an item sits in the optimistic sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    /// Never observed: no entry exists for the id
    Unknown,
    /// Locally mutated, remote write not yet confirmed
    OptimisticPending,
    /// Local and remote state agree as far as this client knows
    Confirmed,
}

impl SyncPhase {
    /// True while a remote write for the item is unconfirmed.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncPhase::OptimisticPending)
    }
}
