//! SMT errors

use thiserror::Error;

use crate::field::FieldElement;

/// Errors raised by the field utility, the hasher and the tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmtError {
    /// Value is `>= p` under the strict field policy
    #[error("value is not in the field: {0}")]
    FieldRange(FieldElement),

    /// Hash called with zero or too many inputs
    #[error("hash arity {got} is outside 1..={max}")]
    InputArity {
        /// Number of inputs supplied
        got: usize,
        /// Largest arity accepted
        max: usize,
    },

    /// All `2^depth` leaf slots are taken
    #[error("merkle tree {id} is full ({capacity} leaves)")]
    TreeFull {
        /// Tree id
        id: String,
        /// Number of leaf slots
        capacity: u64,
    },

    /// Index does not address a leaf of this tree
    #[error("index {index} is not a leaf of a depth-{depth} tree")]
    LeafOutOfRange {
        /// Requested index
        index: u64,
        /// Tree depth
        depth: u32,
    },

    /// Requested depth exceeds what node indices can address
    #[error("tree depth {depth} exceeds maximum {max}")]
    DepthTooLarge {
        /// Requested depth
        depth: u32,
        /// Maximum supported depth
        max: u32,
    },

    /// Proof path is structurally unusable
    #[error("malformed merkle proof: {0}")]
    MalformedProof(String),

    /// Staged update was computed against a different tree state
    #[error("stale update for tree {id}: staged at {staged} leaves, tree has {current}")]
    StaleUpdate {
        /// Tree id
        id: String,
        /// Leaf count the update was staged against
        staged: u64,
        /// Leaf count of the tree now
        current: u64,
    },

    /// Hash backend failed
    #[error("hash backend error: {0}")]
    HashBackend(String),

    /// Snapshot contents cannot describe a valid tree
    #[error("invalid snapshot for tree {id}: {reason}")]
    InvalidSnapshot {
        /// Tree id recorded in the snapshot
        id: String,
        /// What was wrong
        reason: String,
    },
}
