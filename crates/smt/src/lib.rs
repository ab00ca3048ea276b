//! Sparse Merkle Tree (SMT) for the commitment registry
//!
//! This crate provides a fixed-depth, append-only SMT over the BN254 scalar
//! field. Key features:
//! - Implicit default subtrees: only non-default nodes are stored
//! - Pluggable hash primitive behind a field-policy wrapper
//! - Inclusion proofs as sibling values plus side bits, leaf to root
//! - Snapshot format with decimal-string node values

mod error;
pub mod field;
mod hasher;
mod proof;
mod snapshot;
mod tree;

pub use error::SmtError;
pub use field::{check_field, is_in_field, FieldCheckMode, FieldElement, MODULUS};
pub use hasher::{FieldHasher, HashBackend, PoseidonBackend, MAX_HASH_INPUTS};
pub use proof::{expected_sides, fold_path, MerkleProof, LEFT, RIGHT};
pub use snapshot::TreeSnapshot;
pub use tree::{depth_of, left_child, parent, right_child, sibling, SparseMerkleTree, TreeUpdate};

/// Deepest tree supported (`2^32` leaves, node indices fit in `u64`).
pub const MAX_DEPTH: u32 = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree = SparseMerkleTree::new("t", 4, FieldHasher::poseidon(FieldCheckMode::Strict)).unwrap();
        assert_eq!(tree.root(), tree.defaults()[0]);
        assert_eq!(tree.node_count(), 31);
        assert_eq!(tree.capacity(), 16);
    }

    #[test]
    fn test_insert_and_proof() {
        let hasher = FieldHasher::poseidon(FieldCheckMode::Strict);
        let mut tree = SparseMerkleTree::new("t", 8, hasher.clone()).unwrap();

        let value = FieldElement::from(2);
        let index = tree.insert(value).unwrap();

        let proof = tree.build_proof(index).unwrap();
        assert!(proof.verify(&hasher, &tree.root(), &value));
    }
}
