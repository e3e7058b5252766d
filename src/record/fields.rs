use crate::core::{Result, Value};
use crate::storage::OverlayStore;
use log::debug;
use std::collections::BTreeMap;

/// Whether the stored overlay has been pulled into memory.
///
/// `Loaded` is terminal for the lifetime of the in-memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loaded,
}

/// The owner an [`ExpandoFields`] cache loads from.
///
/// `owner_id` is `None` for a record that has never been saved; such a record
/// has nothing stored and every operation works on memory alone.
#[derive(Clone, Copy)]
pub struct OwnerContext<'a> {
    pub store: &'a dyn OverlayStore,
    pub owner_type: &'a str,
    pub owner_id: Option<&'a str>,
}

/// In-memory expando attributes of one record.
///
/// `values` holds overlay attributes and is what a save reconciles against
/// the store. `transient` holds names the naming rule keeps out of the
/// overlay; they live and die with the instance.
#[derive(Debug, Clone, Default)]
pub struct ExpandoFields {
    state: LoadState,
    values: BTreeMap<String, Value>,
    transient: BTreeMap<String, Value>,
}

impl ExpandoFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// Fetch the stored overlay once.
    ///
    /// Stored values never replace names already present in memory, so an
    /// assignment made before the load wins over the stored value.
    pub fn ensure_loaded(&mut self, owner: &OwnerContext<'_>) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let Some(owner_id) = owner.owner_id else {
            return Ok(());
        };

        let stored = owner.store.fetch_all(owner.owner_type, owner_id)?;
        let fetched = stored.len();
        for (key, value) in stored {
            self.values.entry(key).or_insert(Value::Text(value));
        }
        self.state = LoadState::Loaded;

        debug!(
            "Loaded {} expando fields for {}#{}",
            fetched, owner.owner_type, owner_id
        );
        Ok(())
    }

    /// Mark as loaded without fetching. Used once memory is known to mirror
    /// the store, e.g. right after a save.
    pub(crate) fn mark_loaded(&mut self) {
        self.state = LoadState::Loaded;
    }

    pub fn get(&mut self, owner: &OwnerContext<'_>, name: &str) -> Result<Option<&Value>> {
        self.ensure_loaded(owner)?;
        Ok(self.values.get(name))
    }

    pub fn set(&mut self, owner: &OwnerContext<'_>, name: &str, value: Value) -> Result<()> {
        // Load first so the stored value cannot later shadow this write
        self.ensure_loaded(owner)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, owner: &OwnerContext<'_>, name: &str) -> Result<Option<Value>> {
        self.ensure_loaded(owner)?;
        Ok(self.values.remove(name))
    }

    /// In-memory value without triggering a load
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn transient(&self, name: &str) -> Option<&Value> {
        self.transient.get(name)
    }

    pub fn set_transient(&mut self, name: &str, value: Value) {
        self.transient.insert(name.to_string(), value);
    }

    pub fn remove_transient(&mut self, name: &str) -> Option<Value> {
        self.transient.remove(name)
    }
}
