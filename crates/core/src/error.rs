//! Registry errors

use registry_smt::{FieldElement, SmtError};
use thiserror::Error;

use crate::store::StoreError;

/// Everything a registry operation can fail with.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Field, hash or tree failure
    #[error(transparent)]
    Tree(#[from] SmtError),

    /// Tree name is not one of the two configured trees
    #[error("unknown tree id: {0}")]
    InvalidTreeId(String),

    /// Leaf position is outside the tree's address space
    #[error("leaf position {position} is out of range for a depth-{depth} tree")]
    LeafOutOfRange {
        /// Requested position
        position: u64,
        /// Tree depth
        depth: u32,
    },

    /// The credential's nullifier was already consumed
    #[error("nullifier {0} has already been used")]
    DuplicateNullifier(FieldElement),

    /// The verifier rejected the proof
    #[error("proof verification failed")]
    ProofVerificationFailed,

    /// The verifier could not run
    #[error("proof verifier error: {0}")]
    Verifier(String),

    /// Snapshot or ledger I/O did not complete
    #[error("persistence failure: {0}")]
    Persistence(StoreError),

    /// Submission is missing fields or carries unparsable values
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Stored state violates the lock-step invariants
    #[error("registry state is inconsistent: {0}")]
    Inconsistent(String),

    /// A commit was only partly applied; writes are refused until restart
    #[error("registry state is untrusted after a partial commit, restart to reconcile")]
    Untrusted,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RegistryError {
    /// Stable machine-readable code for API responses.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Tree(SmtError::FieldRange(_)) => "field_range",
            Self::Tree(SmtError::InputArity { .. }) => "input_arity",
            Self::Tree(SmtError::TreeFull { .. }) => "tree_full",
            Self::Tree(SmtError::LeafOutOfRange { .. }) | Self::LeafOutOfRange { .. } => "leaf_out_of_range",
            Self::Tree(_) => "tree_error",
            Self::InvalidTreeId(_) => "invalid_tree_id",
            Self::DuplicateNullifier(_) => "duplicate_nullifier",
            Self::ProofVerificationFailed => "proof_verification_failed",
            Self::Verifier(_) => "verifier_error",
            Self::Persistence(_) => "persistence_failure",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::Inconsistent(_) => "inconsistent_state",
            Self::Untrusted => "untrusted_state",
            Self::Config(_) => "invalid_config",
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateNullifier(nullifier) => Self::DuplicateNullifier(nullifier),
            other => Self::Persistence(other),
        }
    }
}
