pub mod store;

pub use store::OptimisticStore;
