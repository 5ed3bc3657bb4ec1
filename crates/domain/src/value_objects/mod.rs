pub mod sync_phase;

pub use sync_phase::SyncPhase;
