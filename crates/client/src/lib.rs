//! ReadSync client - optimistic read-state synchronization cache.
//!
//! A user action ("I looked at this item") flips the apparent read state
//! instantly; the authoritative flag is persisted to a remote store
//! asynchronously - batched behind a debounce window, retried with capped
//! exponential backoff - and freshly fetched server data merges in without
//! ever regressing a locally-applied optimistic state.
//!
//! The public surface is [`ReadStatusCache`]; the remote store and (optional)
//! pending-queue persistence are injected through the port traits in
//! [`ports::outbound`].

pub mod application;
pub mod infrastructure;
pub mod ports;
pub mod state;

pub use application::services::{ReadStatusCache, SyncConfig};
pub use infrastructure::messaging::{SyncBus, SyncSubscription};
pub use ports::outbound::{ReadStateRemotePort, RemoteError, StoragePort};

// Domain types surfaced to collaborators
pub use readsync_domain::{ReadEntry, ReadStateEvent, SyncPhase};
