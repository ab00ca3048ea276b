//! Proof verification seam

use crate::types::{Groth16Proof, PublicSignals};

/// Checks a zero-knowledge proof against its public signals.
///
/// `Ok(false)` means the proof is well formed but does not verify;
/// `Err` means verification could not run at all.
pub trait ProofVerifier: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Verify `proof` against `signals`, in order.
    fn verify(&self, proof: &Groth16Proof, signals: &PublicSignals) -> anyhow::Result<bool>;
}
