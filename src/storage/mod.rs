pub mod engine;
pub mod memory;
pub mod persistence;
pub mod table;

pub use engine::{OverlayStore, UpsertOutcome};
pub use memory::{InMemoryOverlayStore, StoreStats};
pub use persistence::{DurabilityMode, OverlaySnapshot, SnapshotManager};
pub use table::{EntryTable, OverlayEntry};
