//! Append-only, memory-mapped per-stream message log used for recovery
//! and replay (spec.md §4.D). Each stream owns exactly one file and one
//! writer; `write` is serialized per stream by requiring `&mut self`.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{Direction, LogEntry, ParsedEntry};
pub use error::LogError;
pub use store::{LogStore, StreamStore};
