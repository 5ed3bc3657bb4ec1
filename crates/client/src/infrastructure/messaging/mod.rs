pub mod sync_bus;

pub use sync_bus::{SyncBus, SyncSubscription};
