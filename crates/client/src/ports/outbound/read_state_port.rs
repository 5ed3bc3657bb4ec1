//! Remote read-state port - the authoritative store for is-read flags.
//!
//! The cache only needs two operations from whatever backend the surrounding
//! application uses: an idempotent batched "mark read" write and a batched
//! "current read-state" query.
//!
//! Note: the async methods use `async_trait` instead of returning
//! `Pin<Box<dyn Future>>` for better mockall compatibility.

use std::collections::HashMap;

use async_trait::async_trait;

/// Error from the remote read-state store.
///
/// The scheduler treats every variant as retryable: a dropped "read" event is
/// invisible and unrecoverable to the user, so the retry loop never gives up
/// on a pending id - only the backoff interval is bounded.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Network error, timeout, or server-side failure
    #[error("remote request failed: {0}")]
    RequestFailed(String),
    /// The remote answered with something the adapter could not interpret
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

/// Port for persisting and querying per-user read/unread state.
///
/// Partial-batch failure is treated as full-batch failure: on `Err` the
/// scheduler retries every id still pending, relying on `mark_read` being
/// idempotent at the remote side.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadStateRemotePort: Send + Sync {
    /// Mark the given items as read.
    ///
    /// Idempotent by contract - marking an already-read id is harmless.
    async fn mark_read(&self, ids: &[String]) -> Result<(), RemoteError>;

    /// Fetch the authoritative read state for the given items.
    ///
    /// Ids unknown to the remote may be absent from the returned map.
    async fn fetch_read_state(&self, ids: &[String]) -> Result<HashMap<String, bool>, RemoteError>;
}
