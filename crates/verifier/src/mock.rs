//! Mock verifier for running without a verification key

use registry_core::{Groth16Proof, ProofVerifier, PublicSignals};
use tracing::{debug, info};

/// Mock verifier (no actual verification)
#[derive(Debug, Default)]
pub struct MockVerifier {
    reject: bool,
}

impl MockVerifier {
    /// Create a mock verifier that accepts every proof
    pub fn new() -> Self {
        info!("Using mock verifier (proofs are not checked)");
        Self { reject: false }
    }

    /// Create a mock verifier that rejects every proof
    pub const fn rejecting() -> Self {
        Self { reject: true }
    }
}

impl ProofVerifier for MockVerifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn verify(&self, _proof: &Groth16Proof, signals: &PublicSignals) -> anyhow::Result<bool> {
        debug!(signals = signals.len(), accept = !self.reject, "mock verification");
        Ok(!self.reject)
    }
}
