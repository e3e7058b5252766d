//! Snapshot persistence for the overlay table

use crate::core::{DbError, Result};
use crate::storage::table::{EntryTable, OverlayEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Snapshot after every mutating call
    Sync,
    /// Snapshot only on explicit checkpoint
    #[default]
    Async,
    /// Never touch disk
    None,
}

impl FromStr for DurabilityMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" => Ok(Self::None),
            other => Err(DbError::ParseError(format!("Unknown durability mode '{}'", other))),
        }
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
            Self::None => write!(f, "none"),
        }
    }
}

// ============================================================================
// Overlay Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct OverlaySnapshot {
    pub version: u32,
    pub entries: Vec<OverlayEntry>,
    pub next_row_id: u64,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub entry_count: usize,
}

impl OverlaySnapshot {
    pub fn capture(table: &EntryTable) -> Self {
        let entries: Vec<OverlayEntry> = table.entries().cloned().collect();
        let entry_count = entries.len();

        Self {
            version: SNAPSHOT_VERSION,
            entries,
            next_row_id: table.next_row_id(),
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                entry_count,
            },
        }
    }

    pub fn into_table(self) -> Result<EntryTable> {
        if self.version != SNAPSHOT_VERSION {
            return Err(DbError::ExecutionError(format!(
                "Unsupported snapshot version {}",
                self.version
            )));
        }
        EntryTable::restore(self.entries, self.next_row_id)
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    /// Write the snapshot atomically: temp file in the target directory, then rename.
    pub fn save(&self, snapshot: &OverlaySnapshot) -> Result<()> {
        let parent = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| DbError::IoError(format!("Failed to create snapshot directory: {}", e)))?;

        let temp = NamedTempFile::new_in(&parent)
            .map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            rmp_serde::encode::write(&mut writer, snapshot)
                .map_err(|e| DbError::ExecutionError(format!("Failed to serialize snapshot: {}", e)))?;
            writer
                .flush()
                .map_err(|e| DbError::IoError(format!("Failed to write snapshot: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| DbError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to replace snapshot: {}", e)))?;

        log::debug!(
            "Wrote overlay snapshot with {} entries to {}",
            snapshot.metadata.entry_count,
            self.snapshot_path.display()
        );
        Ok(())
    }

    /// Read the snapshot, or `None` when no file has been written yet.
    pub fn load(&self) -> Result<Option<OverlaySnapshot>> {
        if !self.exists() {
            return Ok(None);
        }
        let file = File::open(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to open snapshot: {}", e)))?;
        let snapshot: OverlaySnapshot = rmp_serde::from_read(BufReader::new(file))
            .map_err(|e| DbError::ExecutionError(format!("Failed to deserialize snapshot: {}", e)))?;
        Ok(Some(snapshot))
    }
}
