//! ReadSync domain types.
//!
//! Pure domain layer: the read-state entry entity, its sync lifecycle, and
//! the domain events emitted when apparent state changes. No I/O, no runtime
//! dependencies - everything here is synchronous and infallible.

pub mod entities;
pub mod events;
pub mod value_objects;

pub use entities::ReadEntry;
pub use events::ReadStateEvent;
pub use value_objects::SyncPhase;
