//! Read status cache - the public surface consumed by UI collaborators.
//!
//! One instance is process-wide state for the client's lifetime, created at
//! the application root and injected into whatever surfaces need it (list
//! pages, a header notification bell). Apparent-state reads and writes are
//! synchronous; persistence to the remote store happens behind the scenes
//! through the sync scheduler.
//!
//! Pending writes outlive any one surface: an unmounted component's marks are
//! still flushed because the cache, not the component, owns the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use readsync_domain::{ReadStateEvent, SyncPhase};

use crate::application::services::sync_scheduler::{SyncConfig, SyncScheduler};
use crate::infrastructure::messaging::{SyncBus, SyncSubscription};
use crate::ports::outbound::{ReadStateRemotePort, RemoteError, StoragePort};
use crate::state::OptimisticStore;

/// Optimistic read-state cache with write-behind remote sync.
pub struct ReadStatusCache {
    store: Arc<OptimisticStore>,
    bus: SyncBus,
    scheduler: SyncScheduler,
    remote: Arc<dyn ReadStateRemotePort>,
}

impl ReadStatusCache {
    /// Create the cache and spawn its flush worker.
    pub fn spawn(remote: Arc<dyn ReadStateRemotePort>, config: SyncConfig) -> Self {
        Self::build(Arc::new(OptimisticStore::new()), remote, config)
    }

    /// Create the cache with pending-queue persistence.
    ///
    /// Ids a previous session left unflushed are restored as read-and-pending
    /// and a flush is requested immediately.
    pub fn spawn_with_storage(
        remote: Arc<dyn ReadStateRemotePort>,
        storage: Arc<dyn StoragePort>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(OptimisticStore::with_storage(storage));
        let restored = store.pending_count() > 0;
        let cache = Self::build(store, remote, config);
        if restored {
            cache.force_sync();
        }
        cache
    }

    fn build(
        store: Arc<OptimisticStore>,
        remote: Arc<dyn ReadStateRemotePort>,
        config: SyncConfig,
    ) -> Self {
        let bus = SyncBus::new();
        let scheduler =
            SyncScheduler::spawn(store.clone(), bus.clone(), remote.clone(), config);
        Self {
            store,
            bus,
            scheduler,
            remote,
        }
    }

    /// Cached apparent state, or `None` if the id has never been observed.
    ///
    /// Never blocks, never triggers I/O; a `None` caller falls back to
    /// whatever value it already has from a server payload.
    pub fn read_status(&self, id: &str) -> Option<bool> {
        self.store.read_status(id)
    }

    /// Mark an item as read optimistically.
    ///
    /// Apparent state flips synchronously and subscribers are notified before
    /// this returns, so the UI repaints immediately; the remote write is
    /// scheduled behind the debounce window. Idempotent on an already-read
    /// id.
    pub fn mark_read_optimistic(&self, id: &str) {
        if self.store.mark_read(id) {
            self.bus.dispatch(ReadStateEvent::Marked { id: id.to_string() });
            self.scheduler.schedule_flush();
        }
    }

    /// Reconcile one authoritative server value, e.g. from a list fetch.
    ///
    /// A pending local write always wins over the fetched value (the server
    /// has not absorbed it yet); a settled entry adopts a differing value and
    /// notifies subscribers.
    pub fn merge_server_snapshot(&self, id: &str, server_is_read: bool) {
        if let Some(is_read) = self.store.merge_server_snapshot(id, server_is_read) {
            self.bus.dispatch(ReadStateEvent::Adopted {
                id: id.to_string(),
                is_read,
            });
        }
    }

    /// Reconcile a batch of authoritative values; semantically equivalent to
    /// calling [`merge_server_snapshot`](Self::merge_server_snapshot) per id.
    pub fn merge_server_snapshots(&self, values: &HashMap<String, bool>) {
        for (id, is_read) in values {
            self.merge_server_snapshot(id, *is_read);
        }
    }

    /// Fetch authoritative read state for `ids` from the remote and merge it.
    ///
    /// Convenience for list/detail views on load or refresh. Errors are
    /// returned to the caller - a failed refresh only means stale apparent
    /// state, never a lost write.
    pub async fn refresh(&self, ids: &[String]) -> Result<(), RemoteError> {
        let values = self.remote.fetch_read_state(ids).await?;
        self.merge_server_snapshots(&values);
        Ok(())
    }

    /// True while a remote write for the id is unconfirmed; drives subtle
    /// "syncing" indicators.
    pub fn has_pending_updates(&self, id: &str) -> bool {
        self.store.has_pending_updates(id)
    }

    /// Where the id sits in the sync lifecycle.
    pub fn sync_phase(&self, id: &str) -> SyncPhase {
        self.store.sync_phase(id)
    }

    /// Failed flush attempts recorded for the id while pending.
    pub fn attempts(&self, id: &str) -> u32 {
        self.store.attempts(id)
    }

    /// Number of ids currently awaiting flush.
    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    /// All observed ids with their apparent read state.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.store.snapshot()
    }

    /// Explicitly forget an item (recreated as unread by new business
    /// activity). Subscribers are notified if an entry existed.
    pub fn reset(&self, id: &str) {
        if self.store.reset(id) {
            self.bus.dispatch(ReadStateEvent::Reset { id: id.to_string() });
        }
    }

    /// Request an immediate best-effort flush of whatever is pending.
    ///
    /// Cheap and idempotent; call it on mount/unmount and tab-focus events.
    /// Never blocks UI teardown.
    pub fn force_sync(&self) {
        self.scheduler.force_sync();
    }

    /// Register a callback invoked whenever apparent state changes for any
    /// id. Hold the returned subscription for the component's lifetime;
    /// dropping it unsubscribes.
    pub fn on_sync(&self, callback: impl FnMut(ReadStateEvent) + Send + 'static) -> SyncSubscription {
        self.bus.subscribe(callback)
    }

    /// Stop the flush worker after one final drain attempt.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
