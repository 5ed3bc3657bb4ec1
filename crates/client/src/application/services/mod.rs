pub mod read_status_cache;
pub mod sync_scheduler;

pub use read_status_cache::ReadStatusCache;
pub use sync_scheduler::{SyncConfig, SyncScheduler};
