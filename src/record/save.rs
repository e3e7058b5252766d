use super::fields::OwnerContext;
use super::model::{ExpandoModel, Overlay};
use crate::core::{DbError, Result};
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Persist declared fields only and leave the overlay untouched
    pub skip_expando_fields: bool,
}

impl SaveOptions {
    pub fn skip_expando_fields() -> Self {
        Self {
            skip_expando_fields: true,
        }
    }
}

/// What a save did to the overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Reconciliation was skipped on request
    pub skipped: bool,
}

impl SaveReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Bring the stored overlay of `record` in line with its in-memory attributes.
///
/// Must run after the declared fields were persisted. `was_new` tells that the
/// record had no identity before this save, so nothing can be stored for it
/// and the load is skipped.
pub fn reconcile<M: ExpandoModel>(
    overlay: Overlay<'_>,
    record: &mut M,
    was_new: bool,
) -> Result<SaveReport> {
    let record_type = record.record_type().to_string();
    let owner_id = record
        .owner_id()
        .ok_or_else(|| DbError::IdentityUnavailable(record_type.clone()))?;
    let store = overlay.store();

    if was_new {
        record.expando_mut().mark_loaded();
    } else {
        let owner = OwnerContext {
            store,
            owner_type: &record_type,
            owner_id: Some(&owner_id),
        };
        record.expando_mut().ensure_loaded(&owner)?;
    }

    let mut desired: BTreeMap<String, String> = record
        .expando()
        .iter()
        .filter(|(name, _)| overlay.naming().is_expando(record.schema(), name))
        .map(|(name, value)| (name.to_string(), value.canonical()))
        .collect();

    // Every key must be storable before the first write
    for key in desired.keys() {
        store.validate_key(key)?;
    }

    let mut report = SaveReport::default();
    for (key, stored) in store.fetch_all(&record_type, &owner_id)? {
        match desired.remove(&key) {
            Some(value) if value == stored => report.unchanged += 1,
            Some(value) => {
                store.upsert(&record_type, &owner_id, &key, &value)?;
                report.updated += 1;
            }
            None => {
                store.delete_one(&record_type, &owner_id, &key)?;
                report.deleted += 1;
            }
        }
    }

    for (key, value) in &desired {
        store.insert(&record_type, &owner_id, key, value)?;
        report.inserted += 1;
    }

    debug!(
        "Reconciled expando fields of {}#{}: {} inserted, {} updated, {} deleted, {} unchanged",
        record_type, owner_id, report.inserted, report.updated, report.deleted, report.unchanged
    );
    Ok(report)
}
