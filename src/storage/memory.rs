use super::engine::{OverlayStore, UpsertOutcome};
use super::persistence::{DurabilityMode, OverlaySnapshot, SnapshotManager};
use super::table::{EntryTable, OverlayEntry};
use crate::config::OverlayConfig;
use crate::core::{DbError, Result};
use crate::expression::Lookup;
use log::{debug, trace};
use std::collections::BTreeSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Write counters, mostly useful to check that a save was a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    /// Upserts that found the value already stored
    pub unchanged: u64,
}

impl StoreStats {
    pub fn writes(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }
}

#[derive(Default)]
struct StatsCounters {
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    unchanged: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> StoreStats {
        StoreStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
        }
    }
}

/// In-memory overlay store.
///
/// A single `RwLock` guards the entry table, so every trait call is atomic.
/// With a snapshot path configured the table survives restarts, see
/// [`DurabilityMode`].
pub struct InMemoryOverlayStore {
    table: RwLock<EntryTable>,
    max_key_length: usize,
    snapshots: Option<SnapshotManager>,
    durability: DurabilityMode,
    stats: StatsCounters,
}

impl InMemoryOverlayStore {
    /// Memory-only store with default settings
    pub fn new() -> Self {
        Self::build(&OverlayConfig::default(), EntryTable::new())
    }

    /// Open a store, restoring from the configured snapshot if one exists.
    pub fn open(config: &OverlayConfig) -> Result<Self> {
        let mut store = Self::build(config, EntryTable::new());
        if let Some(manager) = &store.snapshots
            && let Some(snapshot) = manager.load()?
        {
            let table = snapshot.into_table()?;
            debug!(
                "Restored {} overlay entries from {}",
                table.row_count(),
                manager.path().display()
            );
            store.table = RwLock::new(table);
        }
        Ok(store)
    }

    fn build(config: &OverlayConfig, table: EntryTable) -> Self {
        Self {
            table: RwLock::new(table),
            max_key_length: config.max_key_length,
            snapshots: config.snapshot_path.as_ref().map(SnapshotManager::new),
            durability: config.durability,
            stats: StatsCounters::default(),
        }
    }

    /// Write a snapshot now. A no-op without a snapshot path or with
    /// `DurabilityMode::None`.
    pub fn checkpoint(&self) -> Result<()> {
        let table = self.table.read()?;
        self.write_snapshot(&table)
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.snapshot()
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.table.read()?.row_count())
    }

    fn write_snapshot(&self, table: &EntryTable) -> Result<()> {
        match (&self.snapshots, self.durability) {
            (Some(manager), DurabilityMode::Sync | DurabilityMode::Async) => {
                manager.save(&OverlaySnapshot::capture(table))
            }
            _ => Ok(()),
        }
    }

    // Called with the write guard still held
    fn after_write(&self, table: &EntryTable) -> Result<()> {
        if self.durability == DurabilityMode::Sync {
            self.write_snapshot(table)?;
        }
        Ok(())
    }
}

impl Default for InMemoryOverlayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayStore for InMemoryOverlayStore {
    fn fetch_all(&self, owner_type: &str, owner_id: &str) -> Result<Vec<(String, String)>> {
        let table = self.table.read()?;
        Ok(table
            .owner_entries(owner_type, owner_id)
            .into_iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect())
    }

    fn fetch_one(&self, owner_type: &str, owner_id: &str, key: &str) -> Result<String> {
        let table = self.table.read()?;
        table
            .get(owner_type, owner_id, key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| DbError::EntryNotFound {
                owner_type: owner_type.to_string(),
                owner_id: owner_id.to_string(),
                key: key.to_string(),
            })
    }

    fn delete_all(&self, owner_type: &str, owner_id: &str) -> Result<usize> {
        let mut table = self.table.write()?;
        let ids: Vec<u64> = table
            .owner_entries(owner_type, owner_id)
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        for id in &ids {
            table.delete(*id);
        }
        self.stats.deletes.fetch_add(ids.len() as u64, Ordering::Relaxed);
        debug!("Deleted {} expando entries of {}#{}", ids.len(), owner_type, owner_id);

        self.after_write(&table)?;
        Ok(ids.len())
    }

    fn delete_one(&self, owner_type: &str, owner_id: &str, key: &str) -> Result<bool> {
        let mut table = self.table.write()?;
        let Some(id) = table.get(owner_type, owner_id, key).map(|entry| entry.id) else {
            return Ok(false);
        };

        table.delete(id);
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        trace!("Deleted expando {}#{}.{}", owner_type, owner_id, key);

        self.after_write(&table)?;
        Ok(true)
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(DbError::ConstraintViolation("Expando key cannot be empty".into()));
        }
        if key.chars().count() > self.max_key_length {
            return Err(DbError::ConstraintViolation(format!(
                "Expando key '{}' is longer than {} characters",
                key, self.max_key_length
            )));
        }
        Ok(())
    }

    fn insert(&self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<()> {
        self.validate_key(key)?;
        let mut table = self.table.write()?;
        table.insert(owner_type, owner_id, key, value)?;
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
        trace!("Inserted expando {}#{}.{}", owner_type, owner_id, key);

        self.after_write(&table)
    }

    fn upsert(&self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<UpsertOutcome> {
        self.validate_key(key)?;
        let mut table = self.table.write()?;

        let existing = table
            .get(owner_type, owner_id, key)
            .map(|entry| (entry.id, entry.value == value));

        let outcome = match existing {
            Some((_, true)) => {
                self.stats.unchanged.fetch_add(1, Ordering::Relaxed);
                return Ok(UpsertOutcome::Unchanged);
            }
            Some((id, false)) => {
                table.update_value(id, value);
                self.stats.updates.fetch_add(1, Ordering::Relaxed);
                UpsertOutcome::Updated
            }
            None => {
                table.insert(owner_type, owner_id, key, value)?;
                self.stats.inserts.fetch_add(1, Ordering::Relaxed);
                UpsertOutcome::Inserted
            }
        };
        trace!("Upsert expando {}#{}.{}: {:?}", owner_type, owner_id, key, outcome);

        self.after_write(&table)?;
        Ok(outcome)
    }

    fn search(&self, owner_type: &str, key: &str, lookup: Lookup, operand: &str) -> Result<Vec<String>> {
        let table = self.table.read()?;
        let mut owners = Vec::new();
        for entry in table.key_entries(owner_type, key) {
            if lookup.matches(&entry.value, operand)? {
                owners.push(entry.owner_id.clone());
            }
        }
        trace!(
            "Search {}.{}__{}={:?} matched {} owners",
            owner_type,
            key,
            lookup,
            operand,
            owners.len()
        );
        Ok(owners)
    }

    fn distinct_values(&self, owner_type: &str, key: &str) -> Result<BTreeSet<String>> {
        let table = self.table.read()?;
        Ok(table
            .key_entries(owner_type, key)
            .into_iter()
            .map(|entry| entry.value.clone())
            .collect())
    }

    fn count(&self, owner_type: &str) -> Result<usize> {
        let table = self.table.read()?;
        Ok(table.entries().filter(|entry| entry.owner_type == owner_type).count())
    }

    fn entries(&self, owner_type: Option<&str>) -> Result<Vec<OverlayEntry>> {
        let table = self.table.read()?;
        Ok(table
            .entries()
            .filter(|entry| owner_type.is_none_or(|t| entry.owner_type == t))
            .cloned()
            .collect())
    }
}
