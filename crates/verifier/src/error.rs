//! Verifier errors

use std::path::PathBuf;

use thiserror::Error;

/// Failures while setting up a verifier
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The key file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Key file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The key file is not valid JSON of the expected shape
    #[error("failed to parse verification key: {0}")]
    Parse(#[from] serde_json::Error),

    /// The key parsed but does not describe a usable BN254 Groth16 key
    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    /// Unusable verifier settings
    #[error("invalid verifier configuration: {0}")]
    Config(String),
}
