use super::fields::ExpandoFields;
use super::model::{ExpandoModel, Hydrate};
use crate::core::{DbError, Result, Row, Schema, TableSchema, Value};
use std::sync::Arc;

/// A record whose declared fields come from a runtime [`TableSchema`].
#[derive(Debug, Clone)]
pub struct DynamicRecord {
    table: Arc<TableSchema>,
    values: Row,
    expando: ExpandoFields,
}

impl DynamicRecord {
    /// New unsaved record with every declared field NULL
    pub fn new(table: Arc<TableSchema>) -> Self {
        let values = vec![Value::Null; table.schema().column_count()];
        Self {
            table,
            values,
            expando: ExpandoFields::new(),
        }
    }

    /// Builder-style declared field assignment
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    pub fn table(&self) -> &TableSchema {
        &self.table
    }
}

impl ExpandoModel for DynamicRecord {
    fn record_type(&self) -> &str {
        self.table.name()
    }

    fn schema(&self) -> &Schema {
        self.table.schema()
    }

    fn pk(&self) -> Option<Value> {
        self.table
            .schema()
            .primary_key_index()
            .map(|idx| self.values[idx].clone())
    }

    fn assign_pk(&mut self, pk: Value) {
        if let Some(idx) = self.table.schema().primary_key_index() {
            self.values[idx] = pk;
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.table
            .schema()
            .find_column_index(name)
            .map(|idx| self.values[idx].clone())
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self
            .table
            .schema()
            .find_column_index(name)
            .ok_or_else(|| DbError::attribute_not_found(self.table.name(), name))?;
        let column = &self.table.schema().columns()[idx];
        if !value.is_null() {
            column.validate(&value)?;
        }
        self.values[idx] = value;
        Ok(())
    }

    fn expando(&self) -> &ExpandoFields {
        &self.expando
    }

    fn expando_mut(&mut self) -> &mut ExpandoFields {
        &mut self.expando
    }

    fn to_row(&self) -> Row {
        self.values.clone()
    }
}

impl Hydrate for DynamicRecord {
    fn from_row(table: &TableSchema, row: Row) -> Result<Self> {
        table.schema().validate_row(&row)?;
        Ok(Self {
            table: Arc::new(table.clone()),
            values: row,
            expando: ExpandoFields::new(),
        })
    }
}
