// ============================================================================
// ExpandoDB Library
// ============================================================================
//
// Schemaless expando attributes for structured records. A record keeps its
// declared fields in the record store; any other attribute assigned to it is
// kept in an overlay side table of (owner_type, owner_id, key) -> value
// entries, loaded on first touch and reconciled on save.

pub mod config;
pub mod core;
pub mod expression;
pub mod facade;
pub mod query;
pub mod record;
pub mod storage;

// Re-export main types for convenience
pub use config::OverlayConfig;
pub use core::{Column, DataType, DbError, Result, Row, Schema, TableSchema, Value};
pub use expression::Lookup;
pub use facade::ExpandoDb;
pub use query::{Predicate, RecordSet};
pub use record::{
    DynamicRecord, ExpandoFields, ExpandoModel, Hydrate, InMemoryRecordStore, LoadState,
    NamingRule, Overlay, RecordStore, SaveOptions, SaveReport,
};
pub use storage::{
    DurabilityMode, InMemoryOverlayStore, OverlayEntry, OverlayStore, StoreStats, UpsertOutcome,
};
