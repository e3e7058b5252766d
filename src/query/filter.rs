use super::predicate::Predicate;
use crate::core::Result;
use crate::record::ExpandoModel;
use crate::storage::OverlayStore;
use log::debug;
use std::collections::BTreeSet;

/// A base collection: records of one type, in store order.
#[derive(Debug, Clone)]
pub struct RecordSet<M> {
    record_type: String,
    records: Vec<M>,
}

impl<M> RecordSet<M> {
    pub fn new(record_type: impl Into<String>, records: Vec<M>) -> Self {
        Self {
            record_type: record_type.into(),
            records,
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn records(&self) -> &[M] {
        &self.records
    }

    pub fn into_records(self) -> Vec<M> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.records.iter()
    }
}

impl<M> IntoIterator for RecordSet<M> {
    type Item = M;
    type IntoIter = std::vec::IntoIter<M>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Owner ids satisfying every predicate, or `None` when there are no predicates.
///
/// Each predicate is one store search; the matching owner id sets are
/// intersected, stopping early once the intersection is empty.
pub fn matching_owners(
    store: &dyn OverlayStore,
    owner_type: &str,
    predicates: &[Predicate],
) -> Result<Option<BTreeSet<String>>> {
    let mut matched: Option<BTreeSet<String>> = None;
    for predicate in predicates {
        let owners: BTreeSet<String> = store
            .search(owner_type, &predicate.field, predicate.lookup, &predicate.operand)?
            .into_iter()
            .collect();

        let narrowed = match matched {
            None => owners,
            Some(acc) => acc.intersection(&owners).cloned().collect(),
        };
        debug!("{} on {}: {} owners remain", predicate, owner_type, narrowed.len());

        let exhausted = narrowed.is_empty();
        matched = Some(narrowed);
        if exhausted {
            break;
        }
    }
    Ok(matched)
}

/// Keep the records whose overlay satisfies every predicate.
///
/// No predicates means no filtering: the base collection comes back unchanged.
pub fn expando_filter<M: ExpandoModel>(
    store: &dyn OverlayStore,
    base: RecordSet<M>,
    predicates: &[Predicate],
) -> Result<RecordSet<M>> {
    let Some(matched) = matching_owners(store, &base.record_type, predicates)? else {
        debug!("No expando predicates for {}, returning base collection", base.record_type);
        return Ok(base);
    };

    let RecordSet { record_type, mut records } = base;
    records.retain(|record| record.owner_id().is_some_and(|id| matched.contains(&id)));

    Ok(RecordSet::new(record_type, records))
}

/// Every value ever stored for `key` across owners of `owner_type`.
pub fn distinct_values(store: &dyn OverlayStore, owner_type: &str, key: &str) -> Result<BTreeSet<String>> {
    store.distinct_values(owner_type, key)
}
