//! Outbound ports - interfaces the cache consumes.
//!
//! Pure interface definitions. Concrete adapters (HTTP client, browser
//! storage, sqlite, ...) live with the surrounding application.

pub mod read_state_port;
pub mod storage_port;

pub use read_state_port::{ReadStateRemotePort, RemoteError};
pub use storage_port::{storage_keys, StoragePort};

#[cfg(any(test, feature = "testing"))]
pub use read_state_port::MockReadStateRemotePort;
#[cfg(any(test, feature = "testing"))]
pub use storage_port::MockStoragePort;
