//! Integration tests for the expando attribute lifecycle on a hand-written model

use expandodb::{
    Column, DataType, DbError, ExpandoDb, ExpandoFields, ExpandoModel, Hydrate,
    InMemoryOverlayStore, InMemoryRecordStore, Lookup, OverlayConfig, OverlayEntry, OverlayStore,
    Result, Row, SaveOptions, Schema, TableSchema, UpsertOutcome, Value,
};
use lazy_static::lazy_static;
use std::collections::BTreeSet;
use std::sync::Mutex;

lazy_static! {
    static ref TEST_TABLE: TableSchema = TableSchema::new(
        "ExpandoBasedTestModel",
        vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("regular_field", DataType::Text),
            Column::new("regular_fk_id", DataType::Integer),
        ],
    );
}

#[derive(Debug, Default)]
struct ExpandoBasedTestModel {
    id: Option<i64>,
    regular_field: Option<String>,
    regular_fk_id: Option<i64>,
    expando: ExpandoFields,
}

impl ExpandoModel for ExpandoBasedTestModel {
    fn record_type(&self) -> &str {
        TEST_TABLE.name()
    }

    fn schema(&self) -> &Schema {
        TEST_TABLE.schema()
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Integer)
    }

    fn assign_pk(&mut self, pk: Value) {
        if let Value::Integer(id) = pk {
            self.id = Some(id);
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "regular_field" => Some(self.regular_field.clone().into()),
            "regular_fk_id" => Some(self.regular_fk_id.into()),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        match (name, value) {
            ("regular_field", Value::Text(text)) => self.regular_field = Some(text),
            ("regular_field", Value::Null) => self.regular_field = None,
            ("regular_fk_id", Value::Integer(id)) => self.regular_fk_id = Some(id),
            ("regular_fk_id", Value::Null) => self.regular_fk_id = None,
            (name, value) => {
                return Err(DbError::TypeMismatch(format!(
                    "Cannot assign {} to '{}'",
                    value.type_name(),
                    name
                )));
            }
        }
        Ok(())
    }

    fn expando(&self) -> &ExpandoFields {
        &self.expando
    }

    fn expando_mut(&mut self) -> &mut ExpandoFields {
        &mut self.expando
    }
}

impl Hydrate for ExpandoBasedTestModel {
    fn from_row(_table: &TableSchema, row: Row) -> Result<Self> {
        let mut model = Self::default();
        let mut values = row.into_iter();
        if let Some(pk) = values.next() {
            model.assign_pk(pk);
        }
        model.set_field("regular_field", values.next().unwrap_or(Value::Null))?;
        model.set_field("regular_fk_id", values.next().unwrap_or(Value::Null))?;
        Ok(model)
    }
}

fn setup() -> ExpandoDb {
    let db = ExpandoDb::new();
    db.register(TEST_TABLE.clone()).unwrap();
    db
}

fn reload(db: &ExpandoDb, id: i64) -> ExpandoBasedTestModel {
    db.get::<ExpandoBasedTestModel>("ExpandoBasedTestModel", id).unwrap()
}

#[test]
fn test_expando_round_trip() {
    let db = setup();

    let mut m = ExpandoBasedTestModel {
        regular_field: Some("regular".into()),
        ..Default::default()
    };
    db.set_attr(&mut m, "ef1", 9).unwrap();
    db.set_attr(&mut m, "ef2", "two").unwrap();
    db.set_attr(&mut m, "ef3", "Hello World").unwrap();

    let report = db.save(&mut m).unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(m.id, Some(1));

    let mut again = reload(&db, 1);
    assert!(!again.expando().is_loaded());
    assert_eq!(again.regular_field.as_deref(), Some("regular"));

    // Values come back in canonical text form
    assert_eq!(db.get_attr(&mut again, "ef1").unwrap(), Value::Text("9".into()));
    assert!(again.expando().is_loaded());
    assert_eq!(db.get_attr(&mut again, "ef2").unwrap(), Value::Text("two".into()));
    assert_eq!(db.get_attr(&mut again, "ef3").unwrap().to_string(), "Hello World");

    let fields = db.expando_fields(&mut again).unwrap();
    assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["ef1", "ef2", "ef3"]);
}

#[test]
fn test_deleted_attribute_stays_deleted() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "ef1", 9).unwrap();
    db.set_attr(&mut m, "ef2", "two").unwrap();
    db.save(&mut m).unwrap();

    let mut loaded = reload(&db, 1);
    db.del_attr(&mut loaded, "ef2").unwrap();
    let report = db.save(&mut loaded).unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.unchanged, 1);

    let mut fresh = reload(&db, 1);
    let err = db.get_attr(&mut fresh, "ef2").unwrap_err();
    assert!(matches!(err, DbError::AttributeNotFound { .. }));
    assert_eq!(
        err.to_string(),
        "'ExpandoBasedTestModel' has no attribute 'ef2'"
    );
    assert!(matches!(
        db.del_attr(&mut fresh, "ef2"),
        Err(DbError::AttributeNotFound { .. })
    ));
}

#[test]
fn test_second_save_writes_nothing() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "ef1", 9).unwrap();
    db.set_attr(&mut m, "ef3", "X").unwrap();
    db.save(&mut m).unwrap();

    let before = db.overlay_store().stats();
    let report = db.save(&mut m).unwrap();
    assert_eq!(report.writes(), 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(db.overlay_store().stats().writes(), before.writes());

    // A changed value is one update and nothing else
    db.set_attr(&mut m, "ef1", 10).unwrap();
    let report = db.save(&mut m).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.writes(), 1);
    assert_eq!(
        db.overlay_store()
            .fetch_one("ExpandoBasedTestModel", "1", "ef1")
            .unwrap(),
        "10"
    );
}

#[test]
fn test_assignment_before_load_wins() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "ef1", "stored").unwrap();
    db.set_attr(&mut m, "ef2", "kept").unwrap();
    db.save(&mut m).unwrap();

    let mut loaded = reload(&db, 1);
    db.set_attr(&mut loaded, "ef1", "assigned").unwrap();
    assert_eq!(db.get_attr(&mut loaded, "ef1").unwrap().to_string(), "assigned");
    assert_eq!(db.get_attr(&mut loaded, "ef2").unwrap().to_string(), "kept");

    db.save(&mut loaded).unwrap();
    let mut fresh = reload(&db, 1);
    assert_eq!(db.get_attr(&mut fresh, "ef1").unwrap().to_string(), "assigned");
    assert_eq!(db.get_attr(&mut fresh, "ef2").unwrap().to_string(), "kept");
}

#[test]
fn test_declared_fields_bypass_overlay() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "regular_field", "declared").unwrap();
    db.set_attr(&mut m, "regular_fk_id", 7).unwrap();
    assert_eq!(m.regular_field.as_deref(), Some("declared"));
    assert_eq!(m.regular_fk_id, Some(7));

    db.save(&mut m).unwrap();
    assert_eq!(db.overlay_store().count("ExpandoBasedTestModel").unwrap(), 0);

    let err = db.set_attr(&mut m, "regular_fk_id", "seven").unwrap_err();
    assert!(matches!(err, DbError::TypeMismatch(_)));
    assert!(matches!(
        db.del_attr(&mut m, "regular_field"),
        Err(DbError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_private_and_reserved_names_are_not_persisted() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "_cache", "scratch").unwrap();
    db.set_attr(&mut m, "owner_id", 3).unwrap();
    db.set_attr(&mut m, "ef1", 1).unwrap();

    // Still readable on the instance
    assert_eq!(db.get_attr(&mut m, "_cache").unwrap().to_string(), "scratch");

    let report = db.save(&mut m).unwrap();
    assert_eq!(report.inserted, 1);

    let stored = db.overlay_store().fetch_all("ExpandoBasedTestModel", "1").unwrap();
    assert_eq!(stored, vec![("ef1".to_string(), "1".to_string())]);

    let mut fresh = reload(&db, 1);
    assert!(db.get_attr(&mut fresh, "_cache").is_err());
}

#[test]
fn test_skip_expando_fields() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "ef1", 9).unwrap();
    db.save(&mut m).unwrap();

    db.set_attr(&mut m, "ef1", 10).unwrap();
    db.set_attr(&mut m, "regular_field", "changed").unwrap();
    let report = db
        .save_with(&mut m, SaveOptions::skip_expando_fields())
        .unwrap();
    assert!(report.skipped);

    let mut fresh = reload(&db, 1);
    assert_eq!(fresh.regular_field.as_deref(), Some("changed"));
    assert_eq!(db.get_attr(&mut fresh, "ef1").unwrap().to_string(), "9");
}

#[test]
fn test_unsaved_record_does_not_touch_store() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();

    assert!(matches!(
        db.get_attr(&mut m, "ef1"),
        Err(DbError::AttributeNotFound { .. })
    ));
    db.set_attr(&mut m, "ef1", 1).unwrap();
    assert_eq!(db.overlay_store().row_count().unwrap(), 0);
    assert_eq!(db.overlay_store().stats().writes(), 0);
}

#[test]
fn test_delete_removes_overlay() {
    let db = setup();
    let mut first = ExpandoBasedTestModel::default();
    db.set_attr(&mut first, "ef1", 1).unwrap();
    db.save(&mut first).unwrap();

    let mut second = ExpandoBasedTestModel::default();
    db.set_attr(&mut second, "ef1", 2).unwrap();
    db.save(&mut second).unwrap();

    assert!(db.delete(&first).unwrap());
    assert!(db
        .overlay_store()
        .fetch_all("ExpandoBasedTestModel", "1")
        .unwrap()
        .is_empty());
    assert_eq!(db.overlay_store().count("ExpandoBasedTestModel").unwrap(), 1);
    assert!(matches!(
        db.get::<ExpandoBasedTestModel>("ExpandoBasedTestModel", 1),
        Err(DbError::RecordNotFound { .. })
    ));

    // Unsaved records have nothing to delete
    assert!(!db.delete(&ExpandoBasedTestModel::default()).unwrap());
}

#[test]
fn test_find_by_declared_field() {
    let db = setup();
    for name in ["a", "b"] {
        let mut m = ExpandoBasedTestModel {
            regular_field: Some(name.into()),
            ..Default::default()
        };
        db.save(&mut m).unwrap();
    }

    let found: ExpandoBasedTestModel = db.find_by("ExpandoBasedTestModel", "regular_field", "b").unwrap();
    assert_eq!(found.id, Some(2));
    assert!(matches!(
        db.find_by::<ExpandoBasedTestModel>("ExpandoBasedTestModel", "nope", 1),
        Err(DbError::AttributeNotFound { .. })
    ));
}

#[test]
fn test_text_primary_key_is_owner_id() {
    let db = ExpandoDb::new();
    db.register(TableSchema::new(
        "Document",
        vec![
            Column::new("uuid", DataType::Text).primary_key(),
            Column::new("title", DataType::Text),
        ],
    ))
    .unwrap();

    // Text keys are never generated
    let mut unkeyed = db.new_record("Document").unwrap();
    assert!(matches!(
        db.save(&mut unkeyed),
        Err(DbError::ConstraintViolation(_))
    ));

    let key = uuid::Uuid::new_v4().to_string();
    let mut doc = db
        .new_record("Document")
        .unwrap()
        .with("uuid", key.as_str())
        .unwrap();
    db.set_attr(&mut doc, "reviewer", "kim").unwrap();
    db.save(&mut doc).unwrap();

    assert_eq!(
        db.overlay_store().fetch_one("Document", &key, "reviewer").unwrap(),
        "kim"
    );

    let mut loaded: expandodb::DynamicRecord = db.get("Document", key.as_str()).unwrap();
    assert_eq!(db.get_attr(&mut loaded, "reviewer").unwrap().to_string(), "kim");
}

fn canonical_fields(db: &ExpandoDb, model: &mut ExpandoBasedTestModel) -> Vec<(String, String)> {
    db.expando_fields(model)
        .unwrap()
        .into_iter()
        .map(|(name, value)| (name, value.canonical()))
        .collect()
}

fn by_regular_field(db: &ExpandoDb, value: &str) -> ExpandoBasedTestModel {
    db.find_by("ExpandoBasedTestModel", "regular_field", value).unwrap()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_full_model_scenario() {
    let db = setup();

    let mut o = ExpandoBasedTestModel {
        regular_field: Some("2".into()),
        ..Default::default()
    };
    assert!(matches!(
        db.get_attr(&mut o, "strange_field"),
        Err(DbError::AttributeNotFound { .. })
    ));
    db.set_attr(&mut o, "ef1", 14).unwrap();
    db.save(&mut o).unwrap();
    let ef1_row = db.overlay_store().entries(None).unwrap()[0].id;

    let mut o2 = by_regular_field(&db, "2");
    assert_eq!(db.get_attr(&mut o2, "ef1").unwrap().to_string(), "14");
    assert!(db.get_attr(&mut o2, "another_field").is_err());
    db.set_attr(&mut o2, "ef2", 20).unwrap();
    assert_eq!(db.get_attr(&mut o2, "ef1").unwrap().to_string(), "14");
    db.save(&mut o2).unwrap();

    let mut o3 = by_regular_field(&db, "2");
    assert_eq!(db.get_attr(&mut o3, "ef2").unwrap().to_string(), "20");
    assert_eq!(canonical_fields(&db, &mut o3), pairs(&[("ef1", "14"), ("ef2", "20")]));
    db.set_attr(&mut o3, "ef1", 13).unwrap();
    db.set_attr(&mut o3, "ef3", 100).unwrap();
    db.save(&mut o3).unwrap();

    let mut o4 = by_regular_field(&db, "2");
    db.set_attr(&mut o4, "ef3", "Hello World").unwrap();
    db.save(&mut o4).unwrap();
    let expected = pairs(&[("ef1", "13"), ("ef2", "20"), ("ef3", "Hello World")]);
    assert_eq!(canonical_fields(&db, &mut o4), expected);

    let mut o5 = by_regular_field(&db, "2");
    assert_eq!(canonical_fields(&db, &mut o5), expected);

    let mut o6 = by_regular_field(&db, "2");
    db.del_attr(&mut o6, "ef2").unwrap();
    db.save(&mut o6).unwrap();

    let mut o7 = by_regular_field(&db, "2");
    assert_eq!(db.save(&mut o7).unwrap().writes(), 0);

    let mut p = ExpandoBasedTestModel {
        regular_field: Some("3".into()),
        ..Default::default()
    };
    db.set_attr(&mut p, "ef1", 9).unwrap();
    db.save(&mut p).unwrap();

    let regular = |set: expandodb::RecordSet<ExpandoBasedTestModel>| -> Vec<String> {
        set.into_iter().filter_map(|m| m.regular_field).collect()
    };
    let all = || db.all::<ExpandoBasedTestModel>("ExpandoBasedTestModel").unwrap();
    assert_eq!(regular(all()), vec!["2", "3"]);
    assert_eq!(regular(db.filter(all(), [("ef1", 9)]).unwrap()), vec!["3"]);
    assert_eq!(regular(db.filter(all(), [("ef1", 13)]).unwrap()), vec!["2"]);
    assert!(regular(db.filter(all(), [("ef1", 100)]).unwrap()).is_empty());
    assert!(regular(db.filter(all(), [("ef100", 100011)]).unwrap()).is_empty());
    assert_eq!(regular(db.filter(all(), [("ef3", "Hello World")]).unwrap()), vec!["2"]);
    assert!(regular(db.filter(all(), [("ef3", "hello world")]).unwrap()).is_empty());
    assert_eq!(regular(db.filter(all(), [("ef3__iexact", "hello world")]).unwrap()), vec!["2"]);
    assert_eq!(regular(db.filter(all(), [("ef3__istartswith", "hello")]).unwrap()), vec!["2"]);

    // Updates keep their row; the deleted ef2 leaves a gap in the sequence
    let entries = db.overlay_store().entries(None).unwrap();
    let listing: Vec<(&str, &str, &str)> = entries
        .iter()
        .map(|e| (e.owner_id.as_str(), e.key.as_str(), e.value.as_str()))
        .collect();
    assert_eq!(
        listing,
        vec![("1", "ef1", "13"), ("1", "ef3", "Hello World"), ("2", "ef1", "9")]
    );
    assert_eq!(entries[0].id, ef1_row);
    assert_eq!(entries[1].id, ef1_row + 2);
    assert_eq!(entries[2].id, ef1_row + 3);

    let distinct: Vec<String> = db
        .distinct_values("ExpandoBasedTestModel", "ef1")
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(distinct, vec!["13", "9"]);
}

#[test]
fn test_overlong_key_is_rejected_on_assignment() {
    let db = setup();
    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "ef1", "old").unwrap();
    db.set_attr(&mut m, "ef2", "gone").unwrap();
    db.save(&mut m).unwrap();

    let mut loaded = reload(&db, 1);
    db.set_attr(&mut loaded, "ef1", "new").unwrap();
    db.del_attr(&mut loaded, "ef2").unwrap();
    let err = db.set_attr(&mut loaded, &"k".repeat(40), 1).unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation(_)));

    // Nothing was written yet
    assert_eq!(
        db.overlay_store().fetch_all("ExpandoBasedTestModel", "1").unwrap(),
        pairs(&[("ef1", "old"), ("ef2", "gone")])
    );

    let limited = ExpandoDb::open(OverlayConfig::new().max_key_length(4)).unwrap();
    limited.register(TEST_TABLE.clone()).unwrap();
    let mut short = ExpandoBasedTestModel::default();
    limited.set_attr(&mut short, "ef1", 1).unwrap();
    assert!(limited.set_attr(&mut short, "ef123", 1).is_err());
}

/// Model that loses the key the record store hands back.
#[derive(Debug, Default)]
struct ForgetfulModel(ExpandoBasedTestModel);

impl ExpandoModel for ForgetfulModel {
    fn record_type(&self) -> &str {
        self.0.record_type()
    }

    fn schema(&self) -> &Schema {
        self.0.schema()
    }

    fn pk(&self) -> Option<Value> {
        self.0.pk()
    }

    fn assign_pk(&mut self, _pk: Value) {}

    fn field(&self, name: &str) -> Option<Value> {
        self.0.field(name)
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.0.set_field(name, value)
    }

    fn expando(&self) -> &ExpandoFields {
        self.0.expando()
    }

    fn expando_mut(&mut self) -> &mut ExpandoFields {
        self.0.expando_mut()
    }
}

#[test]
fn test_save_without_identity_fails() {
    let db = setup();
    let mut m = ForgetfulModel::default();
    db.set_attr(&mut m, "ef1", 9).unwrap();

    let err = db.save(&mut m).unwrap_err();
    assert!(matches!(err, DbError::IdentityUnavailable(_)));
    assert_eq!(db.overlay_store().count("ExpandoBasedTestModel").unwrap(), 0);
}

/// Store that lets another writer slip one entry in right after a save
/// has read the owner's entries.
#[derive(Default)]
struct RacingStore {
    inner: InMemoryOverlayStore,
    competing: Mutex<Option<(String, String, String, String)>>,
}

impl OverlayStore for RacingStore {
    fn fetch_all(&self, owner_type: &str, owner_id: &str) -> Result<Vec<(String, String)>> {
        let rows = self.inner.fetch_all(owner_type, owner_id)?;
        if let Some((t, id, key, value)) = self.competing.lock().unwrap().take() {
            self.inner.insert(&t, &id, &key, &value)?;
        }
        Ok(rows)
    }

    fn fetch_one(&self, owner_type: &str, owner_id: &str, key: &str) -> Result<String> {
        self.inner.fetch_one(owner_type, owner_id, key)
    }

    fn delete_all(&self, owner_type: &str, owner_id: &str) -> Result<usize> {
        self.inner.delete_all(owner_type, owner_id)
    }

    fn delete_one(&self, owner_type: &str, owner_id: &str, key: &str) -> Result<bool> {
        self.inner.delete_one(owner_type, owner_id, key)
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        self.inner.validate_key(key)
    }

    fn insert(&self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<()> {
        self.inner.insert(owner_type, owner_id, key, value)
    }

    fn upsert(&self, owner_type: &str, owner_id: &str, key: &str, value: &str) -> Result<UpsertOutcome> {
        self.inner.upsert(owner_type, owner_id, key, value)
    }

    fn search(&self, owner_type: &str, key: &str, lookup: Lookup, operand: &str) -> Result<Vec<String>> {
        self.inner.search(owner_type, key, lookup, operand)
    }

    fn distinct_values(&self, owner_type: &str, key: &str) -> Result<BTreeSet<String>> {
        self.inner.distinct_values(owner_type, key)
    }

    fn count(&self, owner_type: &str) -> Result<usize> {
        self.inner.count(owner_type)
    }

    fn entries(&self, owner_type: Option<&str>) -> Result<Vec<OverlayEntry>> {
        self.inner.entries(owner_type)
    }
}

#[test]
fn test_concurrent_insert_surfaces_duplicate_entry() {
    let db = ExpandoDb::with_stores(
        OverlayConfig::default(),
        RacingStore::default(),
        InMemoryRecordStore::new(),
    );
    db.register(TEST_TABLE.clone()).unwrap();

    let mut m = ExpandoBasedTestModel::default();
    db.set_attr(&mut m, "ef9", "mine").unwrap();
    *db.overlay_store().competing.lock().unwrap() = Some((
        "ExpandoBasedTestModel".into(),
        "1".into(),
        "ef9".into(),
        "theirs".into(),
    ));

    let err = db.save(&mut m).unwrap_err();
    assert!(matches!(err, DbError::DuplicateEntry { ref key, .. } if key == "ef9"));
    assert_eq!(
        db.overlay_store()
            .fetch_one("ExpandoBasedTestModel", "1", "ef9")
            .unwrap(),
        "theirs"
    );
}
