//! Common types

use registry_smt::{FieldElement, MerkleProof};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Number of leading public signals the registry consumes.
pub const CONSUMED_SIGNALS: usize = 3;

/// Groth16 proof as emitted by snarkjs.
///
/// Coordinates are decimal strings, projective (`pi_a`, `pi_c` carry a
/// trailing `"1"`, `pi_b` a trailing `["1", "0"]`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    /// G1 point A
    pub pi_a: [String; 3],
    /// G2 point B
    pub pi_b: [[String; 2]; 3],
    /// G1 point C
    pub pi_c: [String; 3],
    /// Always `"groth16"`
    pub protocol: String,
    /// Curve tag, `"bn128"` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

impl Groth16Proof {
    /// Shape check: protocol tag and decimal coordinates.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.protocol != "groth16" {
            return Err(RegistryError::MalformedPayload(format!(
                "unsupported proof protocol {:?}",
                self.protocol
            )));
        }
        let coordinates = self.pi_a.iter().chain(self.pi_b.iter().flatten()).chain(self.pi_c.iter());
        for coordinate in coordinates {
            if coordinate.is_empty() || !coordinate.bytes().all(|b| b.is_ascii_digit()) {
                return Err(RegistryError::MalformedPayload(format!(
                    "proof coordinate {coordinate:?} is not a decimal integer"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered public inputs of the circuit.
///
/// Index 0 is the identity commitment, 1 the eligibility commitment and 2
/// the nullifier. Further signals are carried through to the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicSignals(pub Vec<FieldElement>);

impl PublicSignals {
    /// Signals in circuit order
    pub fn as_slice(&self) -> &[FieldElement] {
        &self.0
    }

    /// Number of signals
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no signals
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<FieldElement>> for PublicSignals {
    fn from(signals: Vec<FieldElement>) -> Self {
        Self(signals)
    }
}

/// Request body of a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// The proof
    pub proof: Groth16Proof,
    /// Its public signals
    pub public_signals: PublicSignals,
}

/// A submission whose payload has been checked and whose signals have been
/// split into their roles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Leaf for the identity tree
    pub identity_commitment: FieldElement,
    /// Leaf for the eligibility tree
    pub eligibility_commitment: FieldElement,
    /// Ledger key
    pub nullifier: FieldElement,
    /// Proof as submitted
    pub proof: Groth16Proof,
    /// All public signals
    pub public_signals: PublicSignals,
}

impl Registration {
    /// Validate the proof shape and split out the consumed signals.
    pub fn from_submission(submission: Submission) -> Result<Self, RegistryError> {
        submission.proof.validate()?;
        let signals = submission.public_signals.as_slice();
        if signals.len() < CONSUMED_SIGNALS {
            return Err(RegistryError::MalformedPayload(format!(
                "expected at least {CONSUMED_SIGNALS} public signals, got {}",
                signals.len()
            )));
        }
        Ok(Self {
            identity_commitment: signals[0],
            eligibility_commitment: signals[1],
            nullifier: signals[2],
            proof: submission.proof,
            public_signals: submission.public_signals,
        })
    }
}

/// Result of an accepted registration. Indices are leaf positions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// Leaf position in the identity tree
    pub identity_index: u64,
    /// Leaf position in the eligibility tree
    pub eligibility_index: u64,
    /// Identity root after the insert
    pub identity_root: FieldElement,
    /// Eligibility root after the insert
    pub eligibility_root: FieldElement,
}

/// Inclusion path for one leaf position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    /// Leaf position (`0 <= leaf_index < 2^depth`)
    pub leaf_index: u64,
    /// Sibling values, leaf to root
    pub path: Vec<FieldElement>,
    /// Side bits, leaf to root
    pub path_indices: Vec<u8>,
    /// Root the path folds to
    pub root: FieldElement,
}

impl MerklePath {
    /// The tree-level proof this path corresponds to, for client-side checks.
    pub fn to_proof(&self, depth: u32) -> MerkleProof {
        MerkleProof {
            leaf_index: self.leaf_index + (1u64 << depth) - 1,
            siblings: self.path.clone(),
            path_indices: self.path_indices.clone(),
        }
    }
}

/// Summary of one tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeInfo {
    /// Current root
    pub root: FieldElement,
    /// Fixed depth
    pub depth: u32,
    /// Number of inserted leaves
    pub leaves_count: u64,
}
