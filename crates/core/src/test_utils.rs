//! Fixtures shared by tests across the workspace.

use registry_smt::FieldElement;

use crate::types::{Groth16Proof, PublicSignals, Registration, Submission};

/// A snarkjs-shaped proof. Passes [`Groth16Proof::validate`] but is not a
/// valid proof for any circuit.
pub fn sample_proof() -> Groth16Proof {
    Groth16Proof {
        pi_a: ["1".into(), "2".into(), "1".into()],
        pi_b: [["3".into(), "4".into()], ["5".into(), "6".into()], ["1".into(), "0".into()]],
        pi_c: ["7".into(), "8".into(), "1".into()],
        protocol: "groth16".into(),
        curve: Some("bn128".into()),
    }
}

/// [`sample_proof`] with the given public signals.
pub fn sample_submission(signals: &[u64]) -> Submission {
    Submission {
        proof: sample_proof(),
        public_signals: PublicSignals(signals.iter().copied().map(FieldElement::from).collect()),
    }
}

/// A registration carrying exactly the three consumed signals.
pub fn sample_registration(identity: u64, eligibility: u64, nullifier: u64) -> Registration {
    let signals: Vec<FieldElement> =
        [identity, eligibility, nullifier].into_iter().map(FieldElement::from).collect();
    Registration {
        identity_commitment: signals[0],
        eligibility_commitment: signals[1],
        nullifier: signals[2],
        proof: sample_proof(),
        public_signals: PublicSignals(signals),
    }
}
