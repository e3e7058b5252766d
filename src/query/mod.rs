//! Cross-record queries on expando fields.

pub mod filter;
pub mod predicate;

pub use filter::{RecordSet, distinct_values, expando_filter, matching_owners};
pub use predicate::{Predicate, parse_predicates};
