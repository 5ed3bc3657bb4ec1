//! Hand-rolled fakes for the outbound ports.
//!
//! `mockall` mocks (`MockReadStateRemotePort`, `MockStoragePort`) cover
//! single-interaction expectations; these fakes cover stateful scenarios -
//! fail-N-times-then-succeed remotes and in-memory storage - where recorded
//! history matters more than call expectations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::ports::outbound::{ReadStateRemotePort, RemoteError, StoragePort};

/// Remote fake that fails a configurable number of `mark_read` calls before
/// succeeding, recording every batch it was asked to mark (including failed
/// attempts).
pub struct FlakyRemote {
    failures_remaining: AtomicU32,
    batches: Mutex<Vec<Vec<String>>>,
    fetch_values: Mutex<HashMap<String, bool>>,
}

impl FlakyRemote {
    /// A remote whose first `failure_count` mark calls reject.
    pub fn failing(failure_count: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failure_count),
            batches: Mutex::new(Vec::new()),
            fetch_values: Mutex::new(HashMap::new()),
        }
    }

    /// A remote that always succeeds.
    pub fn reliable() -> Self {
        Self::failing(0)
    }

    /// Values `fetch_read_state` answers with.
    pub fn set_fetch_values(&self, values: HashMap<String, bool>) {
        *self
            .fetch_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = values;
    }

    /// Change how many further mark calls reject (0 = start succeeding).
    pub fn set_failures_remaining(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Every batch `mark_read` received, in call order.
    pub fn recorded_batches(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReadStateRemotePort for FlakyRemote {
    async fn mark_read(&self, ids: &[String]) -> Result<(), RemoteError> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ids.to_vec());

        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(RemoteError::RequestFailed("transient".to_string()))
        } else {
            Ok(())
        }
    }

    async fn fetch_read_state(&self, ids: &[String]) -> Result<HashMap<String, bool>, RemoteError> {
        let values = self
            .fetch_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(ids
            .iter()
            .filter_map(|id| values.get(id).map(|v| (id.clone(), *v)))
            .collect())
    }
}

/// In-memory [`StoragePort`] standing in for browser local storage.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStorage {
    fn save(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn load(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn remove(&self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
