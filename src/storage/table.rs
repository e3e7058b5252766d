use crate::core::{DbError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One stored `(owner_type, owner_id, key) -> value` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayEntry {
    /// Creation sequence number, unique within the table
    pub id: u64,
    pub owner_type: String,
    /// Primary key of the owning record in canonical text form
    pub owner_id: String,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

type OwnerKey = (String, String);
type TripleKey = (String, String, String);

fn owner_key(owner_type: &str, owner_id: &str) -> OwnerKey {
    (owner_type.to_string(), owner_id.to_string())
}

fn triple_key(owner_type: &str, owner_id: &str, key: &str) -> TripleKey {
    (owner_type.to_string(), owner_id.to_string(), key.to_string())
}

/// Row storage for overlay entries.
///
/// Rows are keyed by creation sequence. Three indexes are kept in step with
/// the rows: the unique triple index, a per-owner index and a per
/// `(owner_type, key)` index used by searches.
#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    rows: BTreeMap<u64, OverlayEntry>,
    next_row_id: u64,
    unique: HashMap<TripleKey, u64>,
    by_owner: HashMap<OwnerKey, BTreeSet<u64>>,
    by_key: HashMap<OwnerKey, BTreeSet<u64>>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from snapshot rows.
    pub fn restore(entries: Vec<OverlayEntry>, next_row_id: u64) -> Result<Self> {
        let mut table = Self::new();
        for entry in entries {
            let triple = triple_key(&entry.owner_type, &entry.owner_id, &entry.key);
            if table.unique.contains_key(&triple) {
                return Err(DbError::DuplicateEntry {
                    owner_type: entry.owner_type,
                    owner_id: entry.owner_id,
                    key: entry.key,
                });
            }
            table.next_row_id = table.next_row_id.max(entry.id + 1);
            table.index(&entry);
            table.rows.insert(entry.id, entry);
        }
        table.next_row_id = table.next_row_id.max(next_row_id);
        Ok(table)
    }

    pub fn insert(&mut self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<u64> {
        if self.unique.contains_key(&triple_key(owner_type, owner_id, key)) {
            return Err(DbError::DuplicateEntry {
                owner_type: owner_type.to_string(),
                owner_id: owner_id.to_string(),
                key: key.to_string(),
            });
        }

        let id = self.next_row_id;
        self.next_row_id += 1;

        let entry = OverlayEntry {
            id,
            owner_type: owner_type.to_string(),
            owner_id: owner_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            created_at: Utc::now(),
        };
        self.index(&entry);
        self.rows.insert(id, entry);

        Ok(id)
    }

    pub fn get(&self, owner_type: &str, owner_id: &str, key: &str) -> Option<&OverlayEntry> {
        self.unique
            .get(&triple_key(owner_type, owner_id, key))
            .and_then(|id| self.rows.get(id))
    }

    /// Overwrite the value of row `id`. Returns false when the row is gone.
    pub fn update_value(&mut self, id: u64, value: &str) -> bool {
        match self.rows.get_mut(&id) {
            Some(entry) => {
                entry.value = value.to_string();
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: u64) -> Option<OverlayEntry> {
        let entry = self.rows.remove(&id)?;
        self.unique
            .remove(&triple_key(&entry.owner_type, &entry.owner_id, &entry.key));
        remove_from(&mut self.by_owner, owner_key(&entry.owner_type, &entry.owner_id), id);
        remove_from(&mut self.by_key, owner_key(&entry.owner_type, &entry.key), id);
        Some(entry)
    }

    /// Entries of one owner in creation order.
    pub fn owner_entries(&self, owner_type: &str, owner_id: &str) -> Vec<&OverlayEntry> {
        self.resolve(self.by_owner.get(&owner_key(owner_type, owner_id)))
    }

    /// Entries for `key` across every owner of `owner_type`, in creation order.
    pub fn key_entries(&self, owner_type: &str, key: &str) -> Vec<&OverlayEntry> {
        self.resolve(self.by_key.get(&owner_key(owner_type, key)))
    }

    pub fn entries(&self) -> impl Iterator<Item = &OverlayEntry> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn next_row_id(&self) -> u64 {
        self.next_row_id
    }

    fn resolve(&self, ids: Option<&BTreeSet<u64>>) -> Vec<&OverlayEntry> {
        ids.map(|ids| ids.iter().filter_map(|id| self.rows.get(id)).collect())
            .unwrap_or_default()
    }

    fn index(&mut self, entry: &OverlayEntry) {
        self.unique.insert(
            triple_key(&entry.owner_type, &entry.owner_id, &entry.key),
            entry.id,
        );
        self.by_owner
            .entry(owner_key(&entry.owner_type, &entry.owner_id))
            .or_default()
            .insert(entry.id);
        self.by_key
            .entry(owner_key(&entry.owner_type, &entry.key))
            .or_default()
            .insert(entry.id);
    }
}

fn remove_from(index: &mut HashMap<OwnerKey, BTreeSet<u64>>, key: OwnerKey, id: u64) {
    if let Some(ids) = index.get_mut(&key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}
