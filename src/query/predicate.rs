use crate::core::{DbError, Result, Value};
use crate::expression::Lookup;
use std::fmt;

const LOOKUP_SEPARATOR: &str = "__";

/// One `field[__lookup] = value` condition on an expando field.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub lookup: Lookup,
    /// Canonical text of the compared value
    pub operand: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            lookup,
            operand: value.into().canonical(),
        }
    }

    /// Parse `ef3__iexact` style names. Without a suffix `default_lookup` applies.
    ///
    /// Only the last `__` segment is an operator; it must name a known lookup.
    pub fn parse(name: &str, value: impl Into<Value>, default_lookup: Lookup) -> Result<Self> {
        let (field, lookup) = match name.rsplit_once(LOOKUP_SEPARATOR) {
            Some((field, op)) => (field, op.parse::<Lookup>()?),
            None => (name, default_lookup),
        };

        if field.is_empty() {
            return Err(DbError::ParseError(format!("Missing field name in '{}'", name)));
        }

        Ok(Self::new(field, lookup, value))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}={:?}", self.field, self.lookup, self.operand)
    }
}

/// Parse a predicate map, keeping the caller's order.
pub fn parse_predicates<I, K, V>(predicates: I, default_lookup: Lookup) -> Result<Vec<Predicate>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    predicates
        .into_iter()
        .map(|(name, value)| Predicate::parse(name.as_ref(), value, default_lookup))
        .collect()
}
