use crate::core::{DbError, Result};
use crate::expression::Lookup;
use crate::storage::DurabilityMode;
use std::path::{Path, PathBuf};

/// Overlay configuration
///
/// Controls the naming rule for expando attributes, the lookup used by
/// predicates without an operator suffix, and snapshot persistence.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Longest accepted expando key
    pub max_key_length: usize,

    /// Lookup used when a predicate carries no `__operator` suffix
    pub default_lookup: Lookup,

    /// Names starting with this prefix are internal bookkeeping
    pub private_prefix: String,

    /// Names ending with any of these are foreign-key shadow attributes
    pub reserved_suffixes: Vec<String>,

    /// Snapshot file for the overlay table
    pub snapshot_path: Option<PathBuf>,

    /// When snapshots are written
    pub durability: DurabilityMode,
}

impl OverlayConfig {
    pub fn new() -> Self {
        Self {
            max_key_length: 32,
            default_lookup: Lookup::Exact,
            private_prefix: "_".to_string(),
            reserved_suffixes: vec!["_id".to_string()],
            snapshot_path: None,
            durability: DurabilityMode::None,
        }
    }

    pub fn max_key_length(mut self, max: usize) -> Self {
        self.max_key_length = max;
        self
    }

    pub fn default_lookup(mut self, lookup: Lookup) -> Self {
        self.default_lookup = lookup;
        self
    }

    pub fn private_prefix(mut self, prefix: &str) -> Self {
        self.private_prefix = prefix.to_string();
        self
    }

    pub fn reserved_suffix(mut self, suffix: &str) -> Self {
        self.reserved_suffixes.push(suffix.to_string());
        self
    }

    /// Persist the overlay table to `path`
    pub fn snapshot_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.snapshot_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Parse from connection string
    ///
    /// Format: `expando://memory?max_key_length=64&lookup=iexact`
    /// or `expando:///var/lib/app/overlay.snapshot?durability=sync`
    ///
    /// # Examples
    ///
    /// ```
    /// use expandodb::{Lookup, OverlayConfig};
    ///
    /// let config = OverlayConfig::from_url("expando://memory?lookup=iexact").unwrap();
    /// assert_eq!(config.default_lookup, Lookup::IExact);
    /// assert!(config.snapshot_path.is_none());
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("expando://")
            .ok_or_else(|| DbError::ParseError("URL must start with expando://".to_string()))?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::new();
        if location != "memory" && !location.is_empty() {
            config = config.snapshot_path(location);
            config.durability = DurabilityMode::Async;
        }

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DbError::ParseError(format!("Invalid URL parameter '{}'", pair)))?;
            match key {
                "max_key_length" => {
                    config.max_key_length = value
                        .parse()
                        .map_err(|_| DbError::ParseError(format!("Invalid max_key_length '{}'", value)))?;
                }
                "lookup" => config.default_lookup = value.parse()?,
                "private_prefix" => config.private_prefix = value.to_string(),
                "reserved_suffix" => config.reserved_suffixes.push(value.to_string()),
                "durability" => config.durability = value.parse()?,
                other => {
                    return Err(DbError::ParseError(format!("Unknown URL parameter '{}'", other)));
                }
            }
        }

        Ok(config)
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::new()
    }
}
