use crate::core::{DataType, DbError, Result, Row, TableSchema, Value};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The structured-record store that owns declared fields.
///
/// Rows are exchanged in schema column order. Identity is the canonical text
/// of the primary-key column.
pub trait RecordStore: Send + Sync {
    fn register(&self, table: TableSchema) -> Result<()>;

    fn table(&self, record_type: &str) -> Result<Arc<TableSchema>>;

    /// Insert or update by identity. A NULL primary key means insert; the
    /// store assigns the key and returns it.
    fn save_row(&self, record_type: &str, row: Row) -> Result<Value>;

    fn get_row(&self, record_type: &str, pk: &Value) -> Result<Row>;

    /// Every row of a type, in insertion order
    fn rows(&self, record_type: &str) -> Result<Vec<Row>>;

    fn delete_row(&self, record_type: &str, pk: &Value) -> Result<bool>;
}

struct RecordTable {
    schema: Arc<TableSchema>,
    pk_index: usize,
    rows: Vec<Row>,
    positions: HashMap<String, usize>,
    next_id: i64,
}

impl RecordTable {
    fn new(schema: TableSchema) -> Result<Self> {
        let pk_index = schema.schema().primary_key_index().ok_or_else(|| {
            DbError::ConstraintViolation(format!("Record type '{}' has no primary key", schema.name()))
        })?;
        Ok(Self {
            schema: Arc::new(schema),
            pk_index,
            rows: Vec::new(),
            positions: HashMap::new(),
            next_id: 1,
        })
    }

    fn assign_pk(&mut self, row: &mut Row) -> Result<()> {
        match row[self.pk_index].clone() {
            Value::Null => {
                let column = &self.schema.schema().columns()[self.pk_index];
                if column.data_type != DataType::Integer {
                    return Err(DbError::ConstraintViolation(format!(
                        "Primary key '{}' of '{}' must be set before saving",
                        column.name,
                        self.schema.name()
                    )));
                }
                let id = self.next_id;
                if self.positions.contains_key(&id.to_string()) {
                    return Err(DbError::ConstraintViolation(format!(
                        "No primary key left to assign in '{}'",
                        self.schema.name()
                    )));
                }
                row[self.pk_index] = Value::Integer(id);
                self.next_id = id.saturating_add(1);
            }
            Value::Integer(id) => self.next_id = self.next_id.max(id.saturating_add(1)),
            _ => {}
        }
        Ok(())
    }

    fn save(&mut self, mut row: Row) -> Result<Value> {
        let expected = self.schema.schema().column_count();
        if row.len() != expected {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                expected,
                row.len()
            )));
        }
        self.assign_pk(&mut row)?;
        self.schema.schema().validate_row(&row)?;

        let pk = row[self.pk_index].clone();
        let key = pk.canonical();
        match self.positions.get(&key) {
            Some(&pos) => self.rows[pos] = row,
            None => {
                self.positions.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
        Ok(pk)
    }

    fn delete(&mut self, pk: &Value) -> bool {
        let Some(pos) = self.positions.remove(&pk.canonical()) else {
            return false;
        };
        self.rows.remove(pos);
        for position in self.positions.values_mut() {
            if *position > pos {
                *position -= 1;
            }
        }
        true
    }
}

/// Minimal in-memory record store.
///
/// Integer primary keys are auto-assigned; other key types must be set by
/// the caller.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, RecordTable>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn register(&self, table: TableSchema) -> Result<()> {
        let mut tables = self.tables.write()?;
        if tables.contains_key(table.name()) {
            return Err(DbError::ConstraintViolation(format!(
                "Record type '{}' already registered",
                table.name()
            )));
        }
        debug!("Registered record type '{}'", table.name());
        tables.insert(table.name().to_string(), RecordTable::new(table)?);
        Ok(())
    }

    fn table(&self, record_type: &str) -> Result<Arc<TableSchema>> {
        let tables = self.tables.read()?;
        tables
            .get(record_type)
            .map(|t| Arc::clone(&t.schema))
            .ok_or_else(|| DbError::RecordTypeNotFound(record_type.to_string()))
    }

    fn save_row(&self, record_type: &str, row: Row) -> Result<Value> {
        let mut tables = self.tables.write()?;
        let table = tables
            .get_mut(record_type)
            .ok_or_else(|| DbError::RecordTypeNotFound(record_type.to_string()))?;
        table.save(row)
    }

    fn get_row(&self, record_type: &str, pk: &Value) -> Result<Row> {
        let tables = self.tables.read()?;
        let table = tables
            .get(record_type)
            .ok_or_else(|| DbError::RecordTypeNotFound(record_type.to_string()))?;
        table
            .positions
            .get(&pk.canonical())
            .map(|&pos| table.rows[pos].clone())
            .ok_or_else(|| DbError::RecordNotFound {
                record_type: record_type.to_string(),
                id: pk.canonical(),
            })
    }

    fn rows(&self, record_type: &str) -> Result<Vec<Row>> {
        let tables = self.tables.read()?;
        tables
            .get(record_type)
            .map(|t| t.rows.clone())
            .ok_or_else(|| DbError::RecordTypeNotFound(record_type.to_string()))
    }

    fn delete_row(&self, record_type: &str, pk: &Value) -> Result<bool> {
        let mut tables = self.tables.write()?;
        let table = tables
            .get_mut(record_type)
            .ok_or_else(|| DbError::RecordTypeNotFound(record_type.to_string()))?;
        Ok(table.delete(pk))
    }
}
