pub mod read_entry;

pub use read_entry::ReadEntry;
