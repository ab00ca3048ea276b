//! SMT inclusion proof generation and verification

use serde::{Deserialize, Serialize};

use crate::error::SmtError;
use crate::field::FieldElement;
use crate::hasher::FieldHasher;

/// Side bit for a node that is the left child of its parent.
pub const LEFT: u8 = 0;
/// Side bit for a node that is the right child of its parent.
pub const RIGHT: u8 = 1;

/// SMT inclusion proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Node index of the proven leaf
    pub leaf_index: u64,
    /// Sibling values from leaf to root (`depth` elements)
    pub siblings: Vec<FieldElement>,
    /// Side of the path node at each level, [`LEFT`] or [`RIGHT`]
    pub path_indices: Vec<u8>,
}

impl MerkleProof {
    /// Fold `leaf` up the path.
    pub fn compute_root(&self, hasher: &FieldHasher, leaf: &FieldElement) -> Result<FieldElement, SmtError> {
        fold_path(hasher, leaf, &self.siblings, &self.path_indices)
    }

    /// Verify this proof for `leaf` against a known root.
    ///
    /// Besides the fold, the side bits must be the ones `leaf_index` implies.
    pub fn verify(&self, hasher: &FieldHasher, root: &FieldElement, leaf: &FieldElement) -> bool {
        if expected_sides(self.leaf_index, self.siblings.len()).as_deref() != Some(self.path_indices.as_slice()) {
            return false;
        }
        matches!(self.compute_root(hasher, leaf), Ok(computed) if computed == *root)
    }
}

/// Side bits a leaf at node index `leaf_index` has in a depth-`depth` tree.
///
/// `None` if the index is not a leaf of such a tree.
pub fn expected_sides(leaf_index: u64, depth: usize) -> Option<Vec<u8>> {
    let first_leaf = 1u64.checked_shl(depth as u32)?.checked_sub(1)?;
    if leaf_index < first_leaf || leaf_index > first_leaf.checked_mul(2)? {
        return None;
    }
    let mut sides = Vec::with_capacity(depth);
    let mut current = leaf_index;
    for _ in 0..depth {
        sides.push(if current % 2 == 1 { LEFT } else { RIGHT });
        current = (current - 1) / 2;
    }
    Some(sides)
}

/// Recompute a root from a leaf, its siblings and side bits.
pub fn fold_path(
    hasher: &FieldHasher,
    leaf: &FieldElement,
    siblings: &[FieldElement],
    sides: &[u8],
) -> Result<FieldElement, SmtError> {
    if siblings.len() != sides.len() {
        return Err(SmtError::MalformedProof(format!(
            "path has {} siblings but {} side bits",
            siblings.len(),
            sides.len()
        )));
    }
    let mut current = *leaf;
    for (sibling, side) in siblings.iter().zip(sides) {
        current = match *side {
            LEFT => hasher.hash_pair(&current, sibling)?,
            RIGHT => hasher.hash_pair(sibling, &current)?,
            other => {
                return Err(SmtError::MalformedProof(format!("side bit must be 0 or 1, got {other}")))
            }
        };
    }
    Ok(current)
}
