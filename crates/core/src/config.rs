//! Registry configuration

use std::env;

use registry_smt::{FieldCheckMode, MAX_DEPTH};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Default tree depth (about 8.4M registrations)
pub const DEFAULT_TREE_DEPTH: u32 = 23;

/// Default identity tree id
pub const DEFAULT_IDENTITY_TREE_ID: &str = "identity";

/// Default eligibility tree id
pub const DEFAULT_ELIGIBILITY_TREE_ID: &str = "eligibility";

/// What the registry needs to know at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Name of the identity-commitment tree
    pub identity_tree_id: String,
    /// Name of the eligibility-commitment tree
    pub eligibility_tree_id: String,
    /// Depth used when the trees are first created
    pub depth: u32,
    /// Policy for values `>= p`
    pub field_check_mode: FieldCheckMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            identity_tree_id: DEFAULT_IDENTITY_TREE_ID.to_string(),
            eligibility_tree_id: DEFAULT_ELIGIBILITY_TREE_ID.to_string(),
            depth: DEFAULT_TREE_DEPTH,
            field_check_mode: FieldCheckMode::Strict,
        }
    }
}

impl RegistryConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup, falling back to defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RegistryError> {
        let defaults = Self::default();
        let depth = match lookup("MERKLE_DEPTH") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| RegistryError::Config(format!("MERKLE_DEPTH is not an integer: {raw:?}")))?,
            None => defaults.depth,
        };
        let field_check_mode = match lookup("FIELD_CHECK_MODE") {
            Some(raw) => raw.parse().map_err(RegistryError::Config)?,
            None => defaults.field_check_mode,
        };
        let config = Self {
            identity_tree_id: lookup("IDENTITY_TREE_ID").unwrap_or(defaults.identity_tree_id),
            eligibility_tree_id: lookup("ELIGIBILITY_TREE_ID").unwrap_or(defaults.eligibility_tree_id),
            depth,
            field_check_mode,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the registry cannot run with.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.depth > MAX_DEPTH {
            return Err(RegistryError::Config(format!("depth {} exceeds maximum {MAX_DEPTH}", self.depth)));
        }
        for id in [&self.identity_tree_id, &self.eligibility_tree_id] {
            validate_tree_id(id)?;
        }
        if self.identity_tree_id == self.eligibility_tree_id {
            return Err(RegistryError::Config(format!(
                "identity and eligibility trees share the id {:?}",
                self.identity_tree_id
            )));
        }
        Ok(())
    }
}

/// Tree ids double as file names.
fn validate_tree_id(id: &str) -> Result<(), RegistryError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if id.is_empty() || id.starts_with('.') || !id.chars().all(allowed) {
        return Err(RegistryError::Config(format!("invalid tree id {id:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.depth, DEFAULT_TREE_DEPTH);
        assert_eq!(config.field_check_mode, FieldCheckMode::Strict);
    }

    #[test]
    fn test_custom_config() {
        let config = RegistryConfig::from_lookup(lookup(&[
            ("MERKLE_DEPTH", "10"),
            ("FIELD_CHECK_MODE", "warn"),
            ("IDENTITY_TREE_ID", "zk"),
            ("ELIGIBILITY_TREE_ID", "dvv"),
        ]))
        .unwrap();
        assert_eq!(config.depth, 10);
        assert_eq!(config.field_check_mode, FieldCheckMode::Warn);
        assert_eq!(config.identity_tree_id, "zk");
        assert_eq!(config.eligibility_tree_id, "dvv");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RegistryConfig::from_lookup(lookup(&[("MERKLE_DEPTH", "deep")])).is_err());
        assert!(RegistryConfig::from_lookup(lookup(&[("MERKLE_DEPTH", "33")])).is_err());
        assert!(RegistryConfig::from_lookup(lookup(&[("FIELD_CHECK_MODE", "loose")])).is_err());
        assert!(RegistryConfig::from_lookup(lookup(&[("IDENTITY_TREE_ID", "eligibility")])).is_err());
        assert!(RegistryConfig::from_lookup(lookup(&[("IDENTITY_TREE_ID", "../etc")])).is_err());
        assert!(RegistryConfig::from_lookup(lookup(&[("ELIGIBILITY_TREE_ID", "")])).is_err());
    }
}
