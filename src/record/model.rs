use super::fields::{ExpandoFields, OwnerContext};
use super::naming::NamingRule;
use crate::core::{DbError, Result, Row, Schema, TableSchema, Value};
use crate::storage::OverlayStore;
use std::collections::BTreeMap;

/// Borrowed handle on the overlay store plus the naming rule in force.
#[derive(Clone, Copy)]
pub struct Overlay<'a> {
    store: &'a dyn OverlayStore,
    naming: &'a NamingRule,
}

impl<'a> Overlay<'a> {
    pub fn new(store: &'a dyn OverlayStore, naming: &'a NamingRule) -> Self {
        Self { store, naming }
    }

    pub fn store(&self) -> &'a dyn OverlayStore {
        self.store
    }

    pub fn naming(&self) -> &'a NamingRule {
        self.naming
    }
}

/// A structured record that carries expando attributes.
///
/// Implementors expose their declared fields and embed an [`ExpandoFields`];
/// the provided `*_attr` methods route each name to one or the other so
/// callers never need to know which kind of attribute they touch.
pub trait ExpandoModel {
    /// Type discriminator, used as the owner type of overlay entries
    fn record_type(&self) -> &str;

    fn schema(&self) -> &Schema;

    /// Primary key read straight from the record, without attribute routing
    fn pk(&self) -> Option<Value>;

    fn assign_pk(&mut self, pk: Value);

    /// Value of a declared field
    fn field(&self, name: &str) -> Option<Value>;

    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;

    fn expando(&self) -> &ExpandoFields;

    fn expando_mut(&mut self) -> &mut ExpandoFields;

    /// Canonical text of the primary key, `None` until the record is saved
    fn owner_id(&self) -> Option<String> {
        self.pk().filter(|pk| !pk.is_null()).map(|pk| pk.canonical())
    }

    /// Declared fields in schema order
    fn to_row(&self) -> Row {
        self.schema()
            .columns()
            .iter()
            .map(|col| self.field(&col.name).unwrap_or(Value::Null))
            .collect()
    }

    fn get_attr(&mut self, overlay: Overlay<'_>, name: &str) -> Result<Value> {
        if self.schema().has_column(name) {
            return self
                .field(name)
                .ok_or_else(|| DbError::attribute_not_found(self.record_type(), name));
        }

        let record_type = self.record_type().to_string();
        let found = if overlay.naming().is_expando(self.schema(), name) {
            let owner_id = self.owner_id();
            let owner = OwnerContext {
                store: overlay.store(),
                owner_type: &record_type,
                owner_id: owner_id.as_deref(),
            };
            self.expando_mut().get(&owner, name)?.cloned()
        } else {
            self.expando().transient(name).cloned()
        };

        found.ok_or_else(|| DbError::attribute_not_found(record_type, name))
    }

    fn set_attr(&mut self, overlay: Overlay<'_>, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.schema().has_column(name) {
            return self.set_field(name, value);
        }

        if !overlay.naming().is_expando(self.schema(), name) {
            self.expando_mut().set_transient(name, value);
            return Ok(());
        }

        overlay.store().validate_key(name)?;

        let record_type = self.record_type().to_string();
        let owner_id = self.owner_id();
        let owner = OwnerContext {
            store: overlay.store(),
            owner_type: &record_type,
            owner_id: owner_id.as_deref(),
        };
        self.expando_mut().set(&owner, name, value)
    }

    fn del_attr(&mut self, overlay: Overlay<'_>, name: &str) -> Result<()> {
        if self.schema().has_column(name) {
            return Err(DbError::UnsupportedOperation(format!(
                "Cannot delete declared field '{}' of '{}'",
                name,
                self.record_type()
            )));
        }

        let record_type = self.record_type().to_string();
        let removed = if overlay.naming().is_expando(self.schema(), name) {
            let owner_id = self.owner_id();
            let owner = OwnerContext {
                store: overlay.store(),
                owner_type: &record_type,
                owner_id: owner_id.as_deref(),
            };
            self.expando_mut().remove(&owner, name)?
        } else {
            self.expando_mut().remove_transient(name)
        };

        removed
            .map(|_| ())
            .ok_or_else(|| DbError::attribute_not_found(record_type, name))
    }

    /// Copy of every overlay attribute, loading the stored ones first
    fn expando_fields(&mut self, overlay: Overlay<'_>) -> Result<BTreeMap<String, Value>> {
        let record_type = self.record_type().to_string();
        let owner_id = self.owner_id();
        let owner = OwnerContext {
            store: overlay.store(),
            owner_type: &record_type,
            owner_id: owner_id.as_deref(),
        };
        self.expando_mut().ensure_loaded(&owner)?;
        Ok(self
            .expando()
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect())
    }
}

/// Builds a fresh, unloaded instance from a stored row.
pub trait Hydrate: ExpandoModel + Sized {
    fn from_row(table: &TableSchema, row: Row) -> Result<Self>;
}
