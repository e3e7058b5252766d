use crate::config::OverlayConfig;
use crate::core::{DbError, Result, TableSchema, Value};
use crate::query::{self, RecordSet};
use crate::record::{
    DynamicRecord, ExpandoModel, Hydrate, InMemoryRecordStore, NamingRule, Overlay, RecordStore,
    SaveOptions, SaveReport, reconcile,
};
use crate::storage::{InMemoryOverlayStore, OverlayStore};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info_span;

/// Records plus their expando overlay behind one handle.
///
/// The record store persists declared fields; the overlay store persists
/// everything else. Saves are explicit: nothing reaches either store until
/// [`ExpandoDb::save`] is called.
///
/// # Examples
///
/// ```
/// use expandodb::{Column, DataType, DynamicRecord, ExpandoDb, TableSchema};
///
/// # fn main() -> expandodb::Result<()> {
/// let db = ExpandoDb::new();
/// db.register(TableSchema::new("Note", vec![
///     Column::new("id", DataType::Integer).primary_key(),
///     Column::new("title", DataType::Text),
/// ]))?;
///
/// let mut note = db.new_record("Note")?.with("title", "groceries")?;
/// db.set_attr(&mut note, "colour", "green")?;
/// db.save(&mut note)?;
///
/// let mut again = db.get::<DynamicRecord>("Note", 1)?;
/// assert_eq!(db.get_attr(&mut again, "colour")?.to_string(), "green");
/// # Ok(())
/// # }
/// ```
pub struct ExpandoDb<S = InMemoryOverlayStore, R = InMemoryRecordStore> {
    overlay: S,
    records: R,
    naming: NamingRule,
    config: OverlayConfig,
}

impl ExpandoDb {
    /// Memory-only database with default configuration
    pub fn new() -> Self {
        Self::with_stores(OverlayConfig::default(), InMemoryOverlayStore::new(), InMemoryRecordStore::new())
    }

    /// Open with `config`, restoring the overlay snapshot if configured.
    pub fn open(config: OverlayConfig) -> Result<Self> {
        let overlay = InMemoryOverlayStore::open(&config)?;
        Ok(Self::with_stores(config, overlay, InMemoryRecordStore::new()))
    }

    /// Write the overlay snapshot now
    pub fn checkpoint(&self) -> Result<()> {
        self.overlay.checkpoint()
    }
}

impl Default for ExpandoDb {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: OverlayStore, R: RecordStore> ExpandoDb<S, R> {
    pub fn with_stores(config: OverlayConfig, overlay: S, records: R) -> Self {
        Self {
            naming: NamingRule::from_config(&config),
            overlay,
            records,
            config,
        }
    }

    pub fn overlay(&self) -> Overlay<'_> {
        Overlay::new(&self.overlay, &self.naming)
    }

    pub fn overlay_store(&self) -> &S {
        &self.overlay
    }

    pub fn record_store(&self) -> &R {
        &self.records
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn register(&self, table: TableSchema) -> Result<()> {
        self.records.register(table)
    }

    /// Fresh unsaved record of a registered type
    pub fn new_record(&self, record_type: &str) -> Result<DynamicRecord> {
        Ok(DynamicRecord::new(self.records.table(record_type)?))
    }

    pub fn save<M: ExpandoModel>(&self, record: &mut M) -> Result<SaveReport> {
        self.save_with(record, SaveOptions::default())
    }

    /// Persist declared fields, then reconcile the overlay unless skipped.
    pub fn save_with<M: ExpandoModel>(&self, record: &mut M, options: SaveOptions) -> Result<SaveReport> {
        let span = info_span!("expando_save", record_type = %record.record_type());
        let _enter = span.enter();

        let was_new = record.owner_id().is_none();
        let pk = self.records.save_row(record.record_type(), record.to_row())?;
        record.assign_pk(pk);

        if options.skip_expando_fields {
            debug!("Skipping expando reconciliation for {}", record.record_type());
            return Ok(SaveReport::skipped());
        }

        reconcile(self.overlay(), record, was_new)
    }

    /// Load a record by primary key. Its overlay stays unloaded until touched.
    pub fn get<M: Hydrate>(&self, record_type: &str, pk: impl Into<Value>) -> Result<M> {
        let table = self.records.table(record_type)?;
        let row = self.records.get_row(record_type, &pk.into())?;
        M::from_row(&table, row)
    }

    /// First record whose declared `field` equals `value`
    pub fn find_by<M: Hydrate>(&self, record_type: &str, field: &str, value: impl Into<Value>) -> Result<M> {
        let value = value.into();
        let table = self.records.table(record_type)?;
        let idx = table
            .schema()
            .find_column_index(field)
            .ok_or_else(|| DbError::attribute_not_found(record_type, field))?;

        let row = self
            .records
            .rows(record_type)?
            .into_iter()
            .find(|row| row[idx] == value)
            .ok_or_else(|| DbError::RecordNotFound {
                record_type: record_type.to_string(),
                id: format!("{}={}", field, value),
            })?;
        M::from_row(&table, row)
    }

    /// Every record of a type, as a base collection for [`ExpandoDb::filter`]
    pub fn all<M: Hydrate>(&self, record_type: &str) -> Result<RecordSet<M>> {
        let table = self.records.table(record_type)?;
        let records = self
            .records
            .rows(record_type)?
            .into_iter()
            .map(|row| M::from_row(&table, row))
            .collect::<Result<Vec<M>>>()?;
        Ok(RecordSet::new(record_type, records))
    }

    /// Delete the record and every overlay entry it owns.
    pub fn delete<M: ExpandoModel>(&self, record: &M) -> Result<bool> {
        let Some(pk) = record.pk().filter(|pk| !pk.is_null()) else {
            return Ok(false);
        };
        let owner_id = pk.canonical();
        let removed = self.records.delete_row(record.record_type(), &pk)?;
        let entries = self.overlay.delete_all(record.record_type(), &owner_id)?;
        debug!(
            "Deleted {}#{} with {} expando entries",
            record.record_type(),
            owner_id,
            entries
        );
        Ok(removed)
    }

    pub fn get_attr<M: ExpandoModel>(&self, record: &mut M, name: &str) -> Result<Value> {
        record.get_attr(self.overlay(), name)
    }

    pub fn set_attr<M: ExpandoModel>(&self, record: &mut M, name: &str, value: impl Into<Value>) -> Result<()> {
        record.set_attr(self.overlay(), name, value)
    }

    pub fn del_attr<M: ExpandoModel>(&self, record: &mut M, name: &str) -> Result<()> {
        record.del_attr(self.overlay(), name)
    }

    pub fn expando_fields<M: ExpandoModel>(&self, record: &mut M) -> Result<BTreeMap<String, Value>> {
        record.expando_fields(self.overlay())
    }

    /// Narrow `base` to records whose overlay matches every `field[__lookup]`
    /// predicate. Suffix-less names use the configured default lookup.
    pub fn filter<M, I, K, V>(&self, base: RecordSet<M>, predicates: I) -> Result<RecordSet<M>>
    where
        M: ExpandoModel,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let predicates = query::parse_predicates(predicates, self.config.default_lookup)?;
        query::expando_filter(&self.overlay, base, &predicates)
    }

    pub fn distinct_values(&self, record_type: &str, key: &str) -> Result<BTreeSet<String>> {
        query::distinct_values(&self.overlay, record_type, key)
    }
}
