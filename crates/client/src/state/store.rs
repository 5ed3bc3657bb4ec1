//! Optimistic store - the in-memory read-state table.
//!
//! Holds current apparent state and provides synchronous read/write for UI
//! surfaces. Every operation here is non-blocking and infallible; all failure
//! handling lives in the sync scheduler. The store is the sole writer of
//! `is_read`/`pending`.
//!
//! Invariant: an id is in the flush queue iff its entry has `pending == true`.
//! The mutex guards short critical sections only - it is never held across an
//! await point and never held while subscriber callbacks run.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use readsync_domain::{ReadEntry, SyncPhase};

use crate::ports::outbound::{storage_keys, StoragePort};

/// In-memory mapping from item id to optimistic read-state, plus the FIFO
/// queue of ids awaiting flush.
pub struct OptimisticStore {
    inner: Mutex<StoreInner>,
    storage: Option<Arc<dyn StoragePort>>,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, ReadEntry>,
    flush_queue: VecDeque<String>,
    /// Monotonic across all entries, so an entry recreated after a reset can
    /// never collide with a flush snapshot taken of its previous life
    version_clock: u64,
}

impl OptimisticStore {
    /// Create an empty store with no persistence.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            storage: None,
        }
    }

    /// Create a store that writes its pending queue through to `storage`,
    /// restoring any queue a previous process left behind.
    ///
    /// Restored ids are recreated as read-and-pending: the local "mark read"
    /// intent survives the restart even though the surrounding item data is
    /// fetched fresh.
    pub fn with_storage(storage: Arc<dyn StoragePort>) -> Self {
        let mut inner = StoreInner::default();

        if let Some(raw) = storage.load(storage_keys::PENDING_QUEUE) {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(ids) => {
                    for id in ids {
                        if id.is_empty() || inner.entries.contains_key(&id) {
                            continue;
                        }
                        inner.version_clock += 1;
                        let entry = ReadEntry::marked(&id, inner.version_clock);
                        inner.entries.insert(id.clone(), entry);
                        inner.flush_queue.push_back(id);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unparseable persisted pending queue");
                    storage.remove(storage_keys::PENDING_QUEUE);
                }
            }
        }

        Self {
            inner: Mutex::new(inner),
            storage: Some(storage),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached apparent state, or `None` if the id has never been observed.
    pub fn read_status(&self, id: &str) -> Option<bool> {
        self.lock().entries.get(id).map(|e| e.is_read)
    }

    /// True while a remote write for the id is unconfirmed.
    pub fn has_pending_updates(&self, id: &str) -> bool {
        self.lock().entries.get(id).map(|e| e.pending).unwrap_or(false)
    }

    /// Where the id sits in the sync lifecycle.
    pub fn sync_phase(&self, id: &str) -> SyncPhase {
        self.lock()
            .entries
            .get(id)
            .map(|e| e.phase())
            .unwrap_or(SyncPhase::Unknown)
    }

    /// Failed flush attempts recorded for the id while pending.
    pub fn attempts(&self, id: &str) -> u32 {
        self.lock().entries.get(id).map(|e| e.attempts).unwrap_or(0)
    }

    /// Number of ids currently awaiting flush.
    pub fn pending_count(&self) -> usize {
        self.lock().flush_queue.len()
    }

    /// All observed ids with their apparent read state.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.lock()
            .entries
            .values()
            .map(|e| (e.id.clone(), e.is_read))
            .collect()
    }

    /// Apply a local "mark as read" mutation.
    ///
    /// Returns true if apparent state changed (the caller notifies
    /// subscribers and nudges the scheduler). Idempotent on an already-read
    /// id.
    pub fn mark_read(&self, id: &str) -> bool {
        debug_assert!(!id.is_empty(), "mark_read called with an empty id");
        if id.is_empty() {
            tracing::warn!("ignoring mark_read for empty id");
            return false;
        }

        let mut inner = self.lock();
        let version = inner.version_clock + 1;
        let changed = match inner.entries.get_mut(id) {
            Some(entry) => entry.mark_read(version),
            None => {
                inner
                    .entries
                    .insert(id.to_string(), ReadEntry::marked(id, version));
                true
            }
        };
        if changed {
            inner.version_clock = version;
            inner.flush_queue.push_back(id.to_string());
            self.persist_queue(&inner);
        }
        changed
    }

    /// Reconcile an authoritative server value.
    ///
    /// Returns the newly visible value if apparent state changed (settled
    /// entry adopting a differing server value), `None` otherwise. A pending
    /// entry ignores the server; an absent entry is created silently - the
    /// caller already holds the server value it just fetched.
    pub fn merge_server_snapshot(&self, id: &str, server_is_read: bool) -> Option<bool> {
        debug_assert!(!id.is_empty(), "merge_server_snapshot called with an empty id");
        if id.is_empty() {
            tracing::warn!("ignoring merge_server_snapshot for empty id");
            return None;
        }

        let mut inner = self.lock();
        match inner.entries.get_mut(id) {
            Some(entry) => entry.adopt_server(server_is_read).then_some(entry.is_read),
            None => {
                inner
                    .entries
                    .insert(id.to_string(), ReadEntry::observed(id, server_is_read));
                None
            }
        }
    }

    /// Remove the entry entirely (item recreated as unread by new business
    /// activity). Returns true if an entry existed.
    pub fn reset(&self, id: &str) -> bool {
        debug_assert!(!id.is_empty(), "reset called with an empty id");
        if id.is_empty() {
            tracing::warn!("ignoring reset for empty id");
            return false;
        }

        let mut inner = self.lock();
        let existed = inner.entries.remove(id).is_some();
        if existed {
            let before = inner.flush_queue.len();
            inner.flush_queue.retain(|queued| queued.as_str() != id);
            if inner.flush_queue.len() != before {
                self.persist_queue(&inner);
            }
        }
        existed
    }

    /// Snapshot the queued ids with their current versions, for one flush.
    ///
    /// The queue itself is left untouched; ids leave it only through
    /// [`confirm_flushed`](Self::confirm_flushed) or [`reset`](Self::reset).
    pub fn flush_snapshot(&self) -> Vec<(String, u64)> {
        let inner = self.lock();
        inner
            .flush_queue
            .iter()
            .filter_map(|id| {
                inner
                    .entries
                    .get(id)
                    .map(|entry| (id.clone(), entry.local_version))
            })
            .collect()
    }

    /// Confirm a successful flush of `snapshot`.
    ///
    /// Clears `pending` and dequeues each id whose version is unchanged since
    /// the snapshot was taken; an id mutated mid-flight stays queued for the
    /// next flush. Returns the confirmed ids.
    pub fn confirm_flushed(&self, snapshot: &[(String, u64)]) -> Vec<String> {
        let mut inner = self.lock();
        let mut confirmed = Vec::new();
        for (id, snapshot_version) in snapshot {
            if let Some(entry) = inner.entries.get_mut(id) {
                if entry.confirm_flushed(*snapshot_version) {
                    confirmed.push(id.clone());
                }
            }
        }
        if !confirmed.is_empty() {
            inner
                .flush_queue
                .retain(|queued| !confirmed.contains(queued));
            self.persist_queue(&inner);
        }
        confirmed
    }

    /// Record a failed flush attempt for every id in `snapshot`.
    pub fn record_failed_attempt(&self, snapshot: &[(String, u64)], at: DateTime<Utc>) {
        let mut inner = self.lock();
        for (id, _) in snapshot {
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.record_failed_attempt(at);
            }
        }
    }

    fn persist_queue(&self, inner: &StoreInner) {
        let Some(storage) = &self.storage else {
            return;
        };
        let ids: Vec<&String> = inner.flush_queue.iter().collect();
        match serde_json::to_string(&ids) {
            Ok(json) => storage.save(storage_keys::PENDING_QUEUE, &json),
            Err(e) => tracing::warn!(error = %e, "failed to serialize pending queue"),
        }
    }
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::MemoryStorage;

    #[test]
    fn unobserved_id_reads_as_none() {
        let store = OptimisticStore::new();
        assert_eq!(store.read_status("a"), None);
        assert!(!store.has_pending_updates("a"));
        assert_eq!(store.sync_phase("a"), SyncPhase::Unknown);
    }

    #[test]
    fn mark_read_flips_state_and_queues_once() {
        let store = OptimisticStore::new();

        assert!(store.mark_read("a"));
        assert_eq!(store.read_status("a"), Some(true));
        assert!(store.has_pending_updates("a"));
        assert_eq!(store.pending_count(), 1);

        // Idempotent: no second queue entry
        assert!(!store.mark_read("a"));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn pending_entry_wins_over_stale_server_read() {
        let store = OptimisticStore::new();
        store.mark_read("a");

        assert_eq!(store.merge_server_snapshot("a", false), None);
        assert_eq!(store.read_status("a"), Some(true));
    }

    #[test]
    fn settled_entry_adopts_server_change() {
        let store = OptimisticStore::new();
        assert_eq!(store.merge_server_snapshot("a", false), None);
        assert_eq!(store.read_status("a"), Some(false));

        // Another session marked it read
        assert_eq!(store.merge_server_snapshot("a", true), Some(true));
        assert_eq!(store.read_status("a"), Some(true));

        // Stale false never regresses it
        assert_eq!(store.merge_server_snapshot("a", false), None);
        assert_eq!(store.read_status("a"), Some(true));
    }

    #[test]
    fn confirm_clears_pending_only_for_unchanged_versions() {
        let store = OptimisticStore::new();
        store.mark_read("a");
        store.mark_read("b");

        let snapshot = store.flush_snapshot();
        assert_eq!(snapshot.len(), 2);

        let confirmed = store.confirm_flushed(&snapshot);
        assert_eq!(confirmed.len(), 2);
        assert!(!store.has_pending_updates("a"));
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn mid_flight_mutation_stays_queued() {
        let store = OptimisticStore::new();
        store.mark_read("a");
        let snapshot = store.flush_snapshot();

        // The entry is reset and re-marked while the flush is in flight; the
        // version clock moves past the snapshot, so the confirmation is stale
        store.reset("a");
        store.mark_read("a");

        let confirmed = store.confirm_flushed(&snapshot);
        assert!(confirmed.is_empty());
        assert!(store.has_pending_updates("a"));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn reset_forgets_the_entry() {
        let store = OptimisticStore::new();
        store.mark_read("a");

        assert!(store.reset("a"));
        assert_eq!(store.read_status("a"), None);
        assert_eq!(store.pending_count(), 0);
        assert!(!store.reset("a"));
    }

    #[test]
    fn failed_attempts_are_recorded_per_id() {
        let store = OptimisticStore::new();
        store.mark_read("c");
        let snapshot = store.flush_snapshot();

        store.record_failed_attempt(&snapshot, Utc::now());
        store.record_failed_attempt(&snapshot, Utc::now());
        assert_eq!(store.attempts("c"), 2);
        assert!(store.has_pending_updates("c"));
    }

    #[test]
    fn pending_queue_round_trips_through_storage() {
        let storage = Arc::new(MemoryStorage::new());

        let store = OptimisticStore::with_storage(storage.clone());
        store.mark_read("a");
        store.mark_read("b");
        drop(store);

        let restored = OptimisticStore::with_storage(storage);
        assert_eq!(restored.pending_count(), 2);
        assert_eq!(restored.read_status("a"), Some(true));
        assert!(restored.has_pending_updates("b"));
    }

    #[test]
    fn queue_changes_write_through_to_storage() {
        use crate::ports::outbound::MockStoragePort;

        let mut storage = MockStoragePort::new();
        storage.expect_load().returning(|_| None);
        storage
            .expect_save()
            .withf(|key, value| key == storage_keys::PENDING_QUEUE && value.contains("a"))
            .times(1)
            .returning(|_, _| ());

        let store = OptimisticStore::with_storage(Arc::new(storage));
        store.mark_read("a");
    }

    #[test]
    fn corrupt_persisted_queue_is_discarded() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save(storage_keys::PENDING_QUEUE, "not json");

        let store = OptimisticStore::with_storage(storage.clone());
        assert_eq!(store.pending_count(), 0);
        assert!(storage.load(storage_keys::PENDING_QUEUE).is_none());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "empty id")]
    fn empty_id_asserts_in_debug_builds() {
        OptimisticStore::new().mark_read("");
    }
}
