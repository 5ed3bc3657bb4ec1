//! Storage port - optional key/value persistence for the pending queue.
//!
//! Backed by whatever durable storage the host platform offers (browser
//! local storage, a config directory file, ...). The cache writes the set of
//! ids awaiting flush through this port so a process restart does not drop an
//! unflushed "mark read".

/// Well-known storage keys used by the cache.
pub mod storage_keys {
    /// JSON array of item ids whose remote write is unconfirmed
    pub const PENDING_QUEUE: &str = "readsync.pending_queue";
}

/// Port for simple synchronous key/value storage.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait StoragePort: Send + Sync {
    /// Save a string value with the given key
    fn save(&self, key: &str, value: &str);

    /// Load a string value by key, returns None if not found
    fn load(&self, key: &str) -> Option<String>;

    /// Remove a value by key
    fn remove(&self, key: &str);
}
