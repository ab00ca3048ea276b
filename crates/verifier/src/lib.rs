//! Proof verification for registry submissions
//!
//! Two verifiers implement [`registry_core::ProofVerifier`]:
//! - [`MockVerifier`]: accepts everything, for local runs and tests
//! - [`Groth16Verifier`]: BN254 Groth16 against a snarkjs verification key
//!
//! The mode is selected by the `VERIFIER_MODE` environment variable.

pub mod config;
pub mod error;
pub mod groth16;
pub mod mock;

use std::sync::Arc;

use registry_core::ProofVerifier;

pub use config::{VerifierConfig, VerifierMode};
pub use error::VerifierError;
pub use groth16::{Groth16Verifier, SnarkjsVerifyingKey};
pub use mock::MockVerifier;

/// Build the verifier `config` asks for.
pub fn build_verifier(config: &VerifierConfig) -> Result<Arc<dyn ProofVerifier>, VerifierError> {
    match config.mode {
        VerifierMode::Mock => Ok(Arc::new(MockVerifier::new())),
        VerifierMode::Groth16 => Ok(Arc::new(Groth16Verifier::from_file(&config.verification_key)?)),
    }
}
