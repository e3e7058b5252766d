use crate::config::OverlayConfig;
use crate::core::Schema;

/// Decides which attribute names belong to the overlay.
///
/// A name is an expando name when it is not a declared field, does not start
/// with the private prefix and does not end with a reserved suffix.
#[derive(Debug, Clone)]
pub struct NamingRule {
    private_prefix: String,
    reserved_suffixes: Vec<String>,
}

impl NamingRule {
    pub fn new(private_prefix: impl Into<String>, reserved_suffixes: Vec<String>) -> Self {
        Self {
            private_prefix: private_prefix.into(),
            reserved_suffixes,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.private_prefix.clone(), config.reserved_suffixes.clone())
    }

    pub fn is_private(&self, name: &str) -> bool {
        !self.private_prefix.is_empty() && name.starts_with(&self.private_prefix)
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && name.ends_with(suffix.as_str()))
    }

    pub fn is_expando(&self, schema: &Schema, name: &str) -> bool {
        !name.is_empty() && !self.is_private(name) && !self.is_reserved(name) && !schema.has_column(name)
    }
}

impl Default for NamingRule {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default())
    }
}
