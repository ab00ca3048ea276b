//! Configuration

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VerifierError;

/// Default snarkjs verification key location
pub const DEFAULT_VERIFICATION_KEY: &str = "verification_key.json";

/// How submissions are checked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierMode {
    /// Accept every well-formed proof (for testing, instant)
    #[default]
    Mock,
    /// Verify Groth16 proofs over BN254 against a snarkjs verification key
    Groth16,
}

impl VerifierMode {
    /// Lowercase name, as accepted by [`FromStr`].
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Groth16 => "groth16",
        }
    }
}

impl fmt::Display for VerifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerifierMode {
    type Err = VerifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "groth16" => Ok(Self::Groth16),
            other => Err(VerifierError::Config(format!("unknown verifier mode {other:?}"))),
        }
    }
}

/// Verifier configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Verifier mode
    pub mode: VerifierMode,
    /// snarkjs `verification_key.json` (used in Groth16 mode)
    pub verification_key: PathBuf,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self { mode: VerifierMode::Mock, verification_key: PathBuf::from(DEFAULT_VERIFICATION_KEY) }
    }
}

impl VerifierConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, VerifierError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup, falling back to defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VerifierError> {
        let mode = lookup("VERIFIER_MODE").map(|s| s.parse::<VerifierMode>()).transpose()?.unwrap_or_default();
        let verification_key = lookup("VERIFICATION_KEY")
            .map_or_else(|| PathBuf::from(DEFAULT_VERIFICATION_KEY), PathBuf::from);
        Ok(Self { mode, verification_key })
    }
}
