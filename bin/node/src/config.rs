//! Node configuration

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use registry_core::RegistryConfig;
use registry_verifier::VerifierConfig;

/// Node configuration
#[derive(Clone, Debug)]
pub(crate) struct NodeConfig {
    /// HTTP bind address
    pub(crate) listen_addr: String,
    /// Root of the file store
    pub(crate) data_dir: PathBuf,
    /// Largest accepted request body in bytes
    pub(crate) max_body_size: usize,
    /// Tree ids, depth and field policy
    pub(crate) registry: RegistryConfig,
    /// Proof verifier selection
    pub(crate) verifier: VerifierConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            data_dir: PathBuf::from("data"),
            max_body_size: 1024 * 1024,
            registry: RegistryConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from environment variables
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup, falling back to defaults for missing keys.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let max_body_size = match lookup("MAX_BODY_SIZE") {
            Some(raw) => raw.trim().parse().with_context(|| format!("MAX_BODY_SIZE is not a byte count: {raw:?}"))?,
            None => defaults.max_body_size,
        };
        Ok(Self {
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: lookup("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            max_body_size,
            registry: RegistryConfig::from_lookup(&lookup)?,
            verifier: VerifierConfig::from_lookup(&lookup)?,
        })
    }
}
