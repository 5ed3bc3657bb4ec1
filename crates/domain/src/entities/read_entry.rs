//! Read entry entity - optimistic read-state for a single tracked item
//!
//! One entry exists per item id the client has observed, either from a server
//! payload or from a local "mark as read" action. The entry is the unit the
//! optimistic store keys its table on, and carries everything the scheduler
//! needs to arbitrate local-vs-remote precedence:
//! - `local_version` detects mutations that land while a flush is in flight
//! - `pending` + retry bookkeeping track the unconfirmed remote write
//!
//! Versions are assigned by the owning store from a clock that is monotonic
//! across all entries, so an entry recreated after a reset can never collide
//! with a flush snapshot taken of its previous life.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::SyncPhase;

/// Optimistic read-state for one tracked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadEntry {
    /// Opaque item id, stable for the item's lifetime
    pub id: String,
    /// Apparent read state shown to the UI
    pub is_read: bool,
    /// True from local mutation until the remote write is confirmed
    pub pending: bool,
    /// Version of the latest local mutation; stale flush confirmations are
    /// discarded by comparing against the version captured at snapshot time
    pub local_version: u64,
    /// Failed flush attempts while this entry has been pending
    pub attempts: u32,
    /// When the last failed flush attempt happened
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ReadEntry {
    /// Create an entry from an authoritative server value (not pending).
    pub fn observed(id: impl Into<String>, is_read: bool) -> Self {
        Self {
            id: id.into(),
            is_read,
            pending: false,
            local_version: 0,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    /// Create an entry from a first local "mark as read" action.
    pub fn marked(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            is_read: true,
            pending: true,
            local_version: version,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    /// Apply a local "mark as read" mutation at `version`.
    ///
    /// Idempotent: an already-read entry is left untouched (no version bump,
    /// no re-queue). Returns true if the entry changed.
    pub fn mark_read(&mut self, version: u64) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.pending = true;
        self.local_version = version;
        self.attempts = 0;
        self.last_attempt_at = None;
        true
    }

    /// Reconcile an authoritative server value into this entry.
    ///
    /// A pending entry ignores the server entirely - the server has not
    /// absorbed the in-flight local write yet. A settled entry adopts a
    /// differing value, except that `is_read` is monotonic: once true, a
    /// stale server `false` never regresses it. Returns true if the visible
    /// value changed.
    pub fn adopt_server(&mut self, server_is_read: bool) -> bool {
        if self.pending {
            return false;
        }
        if self.is_read == server_is_read {
            return false;
        }
        // Monotonic guard: true -> false only happens via an explicit reset.
        if self.is_read && !server_is_read {
            return false;
        }
        self.is_read = server_is_read;
        true
    }

    /// Confirm a successful flush taken at `snapshot_version`.
    ///
    /// If a new local mutation arrived mid-flight the version differs and the
    /// entry stays pending; it rides the next flush. Returns true if the
    /// pending flag was cleared.
    pub fn confirm_flushed(&mut self, snapshot_version: u64) -> bool {
        if !self.pending || self.local_version != snapshot_version {
            return false;
        }
        self.pending = false;
        self.attempts = 0;
        self.last_attempt_at = None;
        true
    }

    /// Record a failed flush attempt.
    pub fn record_failed_attempt(&mut self, at: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(at);
    }

    /// Current position in the sync lifecycle.
    pub fn phase(&self) -> SyncPhase {
        if self.pending {
            SyncPhase::OptimisticPending
        } else {
            SyncPhase::Confirmed
        }
    }
}
