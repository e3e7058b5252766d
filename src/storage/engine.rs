use super::table::OverlayEntry;
use crate::core::Result;
use crate::expression::Lookup;
use std::collections::BTreeSet;

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored value already equalled the new one; nothing was written
    Unchanged,
}

/// Storage engine trait for the overlay side table.
///
/// Every call is atomic on its own. A sequence of calls is not: callers that
/// need a save to be serializable against other writers of the same owner
/// must hold their own lock around it.
pub trait OverlayStore: Send + Sync {
    /// All `(key, value)` pairs of one owner, in creation order
    fn fetch_all(&self, owner_type: &str, owner_id: &str) -> Result<Vec<(String, String)>>;

    /// The value stored for one key, or `EntryNotFound`
    fn fetch_one(&self, owner_type: &str, owner_id: &str, key: &str) -> Result<String>;

    /// Remove every entry of one owner. Returns how many were removed.
    fn delete_all(&self, owner_type: &str, owner_id: &str) -> Result<usize>;

    /// Remove one entry. Returns false when it did not exist.
    fn delete_one(&self, owner_type: &str, owner_id: &str, key: &str) -> Result<bool>;

    /// Reject a key this store cannot hold, before anything is written
    fn validate_key(&self, key: &str) -> Result<()>;

    /// Create a new entry, failing with `DuplicateEntry` if the triple exists
    fn insert(&self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<()>;

    /// Create or overwrite one entry
    fn upsert(&self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<UpsertOutcome>;

    /// Owner ids whose entry for `key` satisfies `lookup` against `operand`
    fn search(&self, owner_type: &str, key: &str, lookup: Lookup, operand: &str) -> Result<Vec<String>>;

    /// Every distinct value stored for `key` across owners of `owner_type`
    fn distinct_values(&self, owner_type: &str, key: &str) -> Result<BTreeSet<String>>;

    /// Number of entries stored for an owner type
    fn count(&self, owner_type: &str) -> Result<usize>;

    /// Full scan, optionally restricted to one owner type
    fn entries(&self, owner_type: Option<&str>) -> Result<Vec<OverlayEntry>>;
}
