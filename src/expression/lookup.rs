use super::pattern;
use crate::core::{DbError, Result, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparator applied by a store search to one stored value.
///
/// The textual names are the `__operator` suffixes accepted by the query
/// helper, e.g. `color__iexact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Lookup {
    #[default]
    Exact,
    IExact,
    Ne,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    Regex,
    IRegex,
    In,
}

impl Lookup {
    pub const ALL: [Lookup; 18] = [
        Lookup::Exact,
        Lookup::IExact,
        Lookup::Ne,
        Lookup::Contains,
        Lookup::IContains,
        Lookup::StartsWith,
        Lookup::IStartsWith,
        Lookup::EndsWith,
        Lookup::IEndsWith,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::Like,
        Lookup::ILike,
        Lookup::Regex,
        Lookup::IRegex,
        Lookup::In,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::ILike => "ilike",
            Self::Regex => "regex",
            Self::IRegex => "iregex",
            Self::In => "in",
        }
    }

    /// Matches `stored` (canonical text from the store) against `operand`
    /// (the canonical text of the predicate value).
    pub fn matches(&self, stored: &str, operand: &str) -> Result<bool> {
        let matched = match self {
            Self::Exact => stored == operand,
            Self::IExact => stored.to_lowercase() == operand.to_lowercase(),
            Self::Ne => stored != operand,
            Self::Contains => pattern::contains(stored, operand, true),
            Self::IContains => pattern::contains(stored, operand, false),
            Self::StartsWith => pattern::starts_with(stored, operand, true),
            Self::IStartsWith => pattern::starts_with(stored, operand, false),
            Self::EndsWith => pattern::ends_with(stored, operand, true),
            Self::IEndsWith => pattern::ends_with(stored, operand, false),
            Self::Gt => order(stored, operand) == Ordering::Greater,
            Self::Gte => order(stored, operand) != Ordering::Less,
            Self::Lt => order(stored, operand) == Ordering::Less,
            Self::Lte => order(stored, operand) != Ordering::Greater,
            Self::Like => pattern::eval_like(stored, operand, true)?,
            Self::ILike => pattern::eval_like(stored, operand, false)?,
            Self::Regex => pattern::eval_regex(stored, operand, true)?,
            Self::IRegex => pattern::eval_regex(stored, operand, false)?,
            Self::In => operand.split(',').map(str::trim).any(|item| item == stored),
        };
        Ok(matched)
    }
}

/// Numeric when both sides read as numbers, lexical otherwise.
fn order(stored: &str, operand: &str) -> Ordering {
    Value::infer(stored)
        .compare(&Value::infer(operand))
        .unwrap_or_else(|_| stored.cmp(operand))
}

impl FromStr for Lookup {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|lookup| lookup.name() == s)
            .ok_or_else(|| DbError::UnsupportedOperation(format!("Unknown lookup '{}'", s)))
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_sensitivity() {
        assert!(Lookup::Exact.matches("Hello World", "Hello World").unwrap());
        assert!(!Lookup::Exact.matches("Hello World", "hello world").unwrap());
        assert!(Lookup::IExact.matches("Hello World", "hello world").unwrap());
        assert!(Lookup::IStartsWith.matches("Hello World", "hello").unwrap());
        assert!(!Lookup::StartsWith.matches("Hello World", "hello").unwrap());
        assert!(Lookup::IEndsWith.matches("Hello World", "WORLD").unwrap());
        assert!(Lookup::IContains.matches("Hello World", "O W").unwrap());
    }

    #[test]
    fn test_relational_numeric_and_lexical() {
        assert!(Lookup::Gt.matches("10", "9").unwrap());
        assert!(Lookup::Lt.matches("9", "10").unwrap());
        assert!(Lookup::Gte.matches("13", "13").unwrap());
        assert!(Lookup::Lte.matches("2.5", "3").unwrap());
        assert!(Lookup::Gt.matches("beta", "alpha").unwrap());
        assert!(Lookup::Lt.matches("10", "abc").unwrap());
    }

    #[test]
    fn test_in_and_patterns() {
        assert!(Lookup::In.matches("9", "13, 9").unwrap());
        assert!(!Lookup::In.matches("100", "13,9").unwrap());
        assert!(Lookup::ILike.matches("Hello World", "h%d").unwrap());
        assert!(Lookup::Regex.matches("ef-2024", r"\d+").unwrap());
        assert!(Lookup::Ne.matches("a", "b").unwrap());
    }

    #[test]
    fn test_parse_names() {
        for lookup in Lookup::ALL {
            assert_eq!(lookup.name().parse::<Lookup>().unwrap(), lookup);
        }
        assert!(matches!("between".parse::<Lookup>(), Err(DbError::UnsupportedOperation(_))));
    }
}
