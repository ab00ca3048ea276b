//! Sparse Merkle Tree implementation

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::SmtError;
use crate::field::FieldElement;
use crate::hasher::FieldHasher;
use crate::proof::{fold_path, MerkleProof, LEFT, RIGHT};
use crate::snapshot::TreeSnapshot;
use crate::MAX_DEPTH;

/// Left child of node `index`
pub const fn left_child(index: u64) -> u64 {
    2 * index + 1
}

/// Right child of node `index`
pub const fn right_child(index: u64) -> u64 {
    2 * index + 2
}

/// Parent of node `index` (root has none; callers never ask)
pub const fn parent(index: u64) -> u64 {
    (index - 1) / 2
}

/// Level of node `index`, root is 0.
pub const fn depth_of(index: u64) -> u32 {
    (index + 1).ilog2()
}

/// Whether `index` is the left child of its parent.
pub const fn is_left_child(index: u64) -> bool {
    index % 2 == 1
}

/// The other child of `index`'s parent.
pub const fn sibling(index: u64) -> u64 {
    if is_left_child(index) {
        index + 1
    } else {
        index - 1
    }
}

/// Node writes produced by one staged insertion.
///
/// Computed by [`SparseMerkleTree::stage_insert`] without touching the tree,
/// applied with [`SparseMerkleTree::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeUpdate {
    leaf_index: u64,
    base_leaves_count: u64,
    writes: Vec<(u64, Option<FieldElement>)>,
    root: FieldElement,
}

impl TreeUpdate {
    /// Node index the value lands on
    pub const fn leaf_index(&self) -> u64 {
        self.leaf_index
    }

    /// Leaf count after the update
    pub const fn leaves_count(&self) -> u64 {
        self.base_leaves_count + 1
    }

    /// Root after the update
    pub const fn root(&self) -> FieldElement {
        self.root
    }
}

/// Fixed-depth, append-only SMT.
///
/// Only nodes whose value differs from the default for their level are
/// stored. Everything else is implied by `defaults`.
#[derive(Clone, Debug)]
pub struct SparseMerkleTree {
    id: String,
    depth: u32,
    leaves_count: u64,
    /// Non-default nodes: node index -> value
    nodes: HashMap<u64, FieldElement>,
    /// Default value per level, `defaults[depth]` is the empty leaf
    defaults: Vec<FieldElement>,
    hasher: FieldHasher,
}

impl SparseMerkleTree {
    /// Create an empty tree.
    pub fn new(id: impl Into<String>, depth: u32, hasher: FieldHasher) -> Result<Self, SmtError> {
        if depth > MAX_DEPTH {
            return Err(SmtError::DepthTooLarge { depth, max: MAX_DEPTH });
        }
        let defaults = Self::generate_defaults(depth, &hasher)?;
        Ok(Self {
            id: id.into(),
            depth,
            leaves_count: 0,
            nodes: HashMap::new(),
            defaults,
            hasher,
        })
    }

    /// `defaults[depth] = H(0)`, then `defaults[d] = H(defaults[d+1], defaults[d+1])`.
    fn generate_defaults(depth: u32, hasher: &FieldHasher) -> Result<Vec<FieldElement>, SmtError> {
        let mut defaults = vec![FieldElement::ZERO; depth as usize + 1];
        defaults[depth as usize] = hasher.hash(&[FieldElement::ZERO])?;
        for level in (0..depth as usize).rev() {
            let child = defaults[level + 1];
            defaults[level] = hasher.hash_pair(&child, &child)?;
        }
        Ok(defaults)
    }

    /// Tree id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tree depth
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of inserted leaves
    pub const fn leaves_count(&self) -> u64 {
        self.leaves_count
    }

    /// Number of leaf slots, `2^depth`
    pub const fn capacity(&self) -> u64 {
        1 << self.depth
    }

    /// Nodes in a full tree of this depth
    pub const fn node_count(&self) -> u64 {
        (1 << (self.depth + 1)) - 1
    }

    /// Node index of the first leaf
    pub const fn first_leaf_index(&self) -> u64 {
        self.capacity() - 1
    }

    /// Whether node `index` is a leaf
    pub const fn is_leaf_index(&self, index: u64) -> bool {
        index >= self.first_leaf_index() && index < self.node_count()
    }

    /// Node index of the leaf at `position` (0-based insertion ordinal).
    pub fn leaf_node_index(&self, position: u64) -> Result<u64, SmtError> {
        if position >= self.capacity() {
            return Err(SmtError::LeafOutOfRange { index: position, depth: self.depth });
        }
        Ok(position + self.first_leaf_index())
    }

    /// Default value per level
    pub fn defaults(&self) -> &[FieldElement] {
        &self.defaults
    }

    /// Number of explicitly stored nodes
    pub fn non_default_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The hasher this tree was built with
    pub const fn hasher(&self) -> &FieldHasher {
        &self.hasher
    }

    /// Get the root value
    pub fn root(&self) -> FieldElement {
        self.get_node(0)
    }

    /// Node value, falling back to the level default.
    pub fn get_node(&self, index: u64) -> FieldElement {
        match self.nodes.get(&index) {
            Some(value) => *value,
            None => self.defaults[depth_of(index) as usize],
        }
    }

    /// Append `value` at the next free leaf and return its node index.
    pub fn insert(&mut self, value: FieldElement) -> Result<u64, SmtError> {
        let update = self.stage_insert(value)?;
        let leaf_index = update.leaf_index;
        self.apply(update)?;
        Ok(leaf_index)
    }

    /// Compute the writes an insertion of `value` would make.
    ///
    /// The tree is not modified. Only the path from the new leaf to the root
    /// changes, and no sibling along that path is on it, so siblings are read
    /// from the current state.
    pub fn stage_insert(&self, value: FieldElement) -> Result<TreeUpdate, SmtError> {
        if self.leaves_count >= self.capacity() {
            return Err(SmtError::TreeFull { id: self.id.clone(), capacity: self.capacity() });
        }
        self.hasher.check(&value)?;

        let leaf_index = self.leaves_count + self.first_leaf_index();
        let mut writes = Vec::with_capacity(self.depth as usize + 1);
        self.record(&mut writes, leaf_index, value, self.depth);

        let mut current = leaf_index;
        let mut current_value = value;
        for level in (0..self.depth).rev() {
            let sibling_value = self.get_node(sibling(current));
            let (left, right) = if is_left_child(current) {
                (current_value, sibling_value)
            } else {
                (sibling_value, current_value)
            };
            current = parent(current);
            current_value = self.hasher.hash_pair(&left, &right)?;
            self.record(&mut writes, current, current_value, level);
        }

        Ok(TreeUpdate { leaf_index, base_leaves_count: self.leaves_count, writes, root: current_value })
    }

    /// Store non-default values, drop entries that went back to default.
    fn record(&self, writes: &mut Vec<(u64, Option<FieldElement>)>, index: u64, value: FieldElement, level: u32) {
        if value != self.defaults[level as usize] {
            writes.push((index, Some(value)));
        } else if self.nodes.contains_key(&index) {
            writes.push((index, None));
        }
    }

    /// Apply a staged insertion.
    ///
    /// Fails if the tree changed since the update was staged.
    pub fn apply(&mut self, update: TreeUpdate) -> Result<(), SmtError> {
        if update.base_leaves_count != self.leaves_count {
            return Err(SmtError::StaleUpdate {
                id: self.id.clone(),
                staged: update.base_leaves_count,
                current: self.leaves_count,
            });
        }
        for (index, value) in update.writes {
            match value {
                Some(value) => {
                    self.nodes.insert(index, value);
                }
                None => {
                    self.nodes.remove(&index);
                }
            }
        }
        self.leaves_count += 1;
        debug!(tree = %self.id, leaf = update.leaf_index, leaves = self.leaves_count, "leaf inserted");
        Ok(())
    }

    /// Build the inclusion proof for the leaf at node `leaf_index`.
    pub fn build_proof(&self, leaf_index: u64) -> Result<MerkleProof, SmtError> {
        if !self.is_leaf_index(leaf_index) {
            return Err(SmtError::LeafOutOfRange { index: leaf_index, depth: self.depth });
        }
        let mut siblings = Vec::with_capacity(self.depth as usize);
        let mut path_indices = Vec::with_capacity(self.depth as usize);
        let mut current = leaf_index;
        for _ in 0..self.depth {
            siblings.push(self.get_node(sibling(current)));
            path_indices.push(if is_left_child(current) { LEFT } else { RIGHT });
            current = parent(current);
        }
        Ok(MerkleProof { leaf_index, siblings, path_indices })
    }

    /// Check a path against the current root.
    pub fn verify_proof(&self, leaf: &FieldElement, siblings: &[FieldElement], sides: &[u8]) -> bool {
        if siblings.len() != self.depth as usize {
            return false;
        }
        matches!(fold_path(&self.hasher, leaf, siblings, sides), Ok(root) if root == self.root())
    }

    /// Full snapshot of the current state.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            id: self.id.clone(),
            depth: self.depth,
            leaves_count: self.leaves_count,
            nodes: self.nodes.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }

    /// Snapshot of the state `update` would produce, without applying it.
    pub fn snapshot_after(&self, update: &TreeUpdate) -> Result<TreeSnapshot, SmtError> {
        if update.base_leaves_count != self.leaves_count {
            return Err(SmtError::StaleUpdate {
                id: self.id.clone(),
                staged: update.base_leaves_count,
                current: self.leaves_count,
            });
        }
        let mut nodes: BTreeMap<u64, FieldElement> = self.nodes.iter().map(|(k, v)| (*k, *v)).collect();
        for (index, value) in &update.writes {
            match value {
                Some(value) => {
                    nodes.insert(*index, *value);
                }
                None => {
                    nodes.remove(index);
                }
            }
        }
        Ok(TreeSnapshot {
            id: self.id.clone(),
            depth: self.depth,
            leaves_count: update.leaves_count(),
            nodes,
        })
    }

    /// Rebuild a tree from a snapshot.
    ///
    /// Stored nodes are taken as-is; only the defaults are recomputed.
    pub fn from_snapshot(snapshot: TreeSnapshot, hasher: FieldHasher) -> Result<Self, SmtError> {
        let TreeSnapshot { id, depth, leaves_count, nodes } = snapshot;
        let mut tree = Self::new(id, depth, hasher)?;
        let invalid = |reason: String| SmtError::InvalidSnapshot { id: tree.id.clone(), reason };

        if leaves_count > tree.capacity() {
            return Err(invalid(format!("{leaves_count} leaves exceed capacity {}", tree.capacity())));
        }
        let mut kept = HashMap::with_capacity(nodes.len());
        for (index, value) in nodes {
            if index >= tree.node_count() {
                return Err(invalid(format!("node index {index} outside tree of {} nodes", tree.node_count())));
            }
            if tree.is_leaf_index(index) && index - tree.first_leaf_index() >= leaves_count {
                return Err(invalid(format!("leaf {index} set beyond {leaves_count} inserted leaves")));
            }
            tree.hasher.check(&value)?;
            if value != tree.defaults[depth_of(index) as usize] {
                kept.insert(index, value);
            }
        }
        tree.nodes = kept;
        tree.leaves_count = leaves_count;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field::FieldCheckMode;
    use crate::hasher::HashBackend;

    /// `H(x) = x`, `H(x, y) = x + y`, optionally mod a small prime.
    struct Additive {
        modulus: Option<u64>,
    }

    impl HashBackend for Additive {
        fn name(&self) -> &'static str {
            "additive"
        }

        fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement, String> {
            let sum: u64 = inputs.iter().map(|v| v.as_u256().as_limbs()[0]).sum();
            Ok(FieldElement::from(self.modulus.map_or(sum, |m| sum % m)))
        }
    }

    fn additive(modulus: Option<u64>) -> FieldHasher {
        FieldHasher::new(Arc::new(Additive { modulus }), FieldCheckMode::Strict)
    }

    fn poseidon() -> FieldHasher {
        FieldHasher::poseidon(FieldCheckMode::Strict)
    }

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    #[test]
    fn test_index_helpers() {
        assert_eq!(left_child(0), 1);
        assert_eq!(right_child(0), 2);
        assert_eq!(parent(1), 0);
        assert_eq!(parent(2), 0);
        assert_eq!(parent(6), 2);
        assert_eq!(depth_of(0), 0);
        assert_eq!(depth_of(2), 1);
        assert_eq!(depth_of(3), 2);
        assert_eq!(depth_of(6), 2);
        assert_eq!(depth_of(7), 3);
        assert_eq!(sibling(3), 4);
        assert_eq!(sibling(4), 3);
        // Large indices stay exact
        assert_eq!(depth_of((1u64 << 53) - 1), 53);
        assert_eq!(depth_of((1u64 << 53) - 2), 52);
    }

    #[test]
    fn test_toy_additive_example() {
        let mut tree = SparseMerkleTree::new("toy", 1, additive(None)).unwrap();
        assert_eq!(tree.defaults(), &[fe(0), fe(0)]);

        assert_eq!(tree.insert(fe(5)).unwrap(), 1);
        assert_eq!(tree.root(), fe(5));
        assert_eq!(tree.insert(fe(7)).unwrap(), 2);
        assert_eq!(tree.root(), fe(12));

        let proof = tree.build_proof(2).unwrap();
        assert_eq!(proof.siblings, vec![fe(5)]);
        assert_eq!(proof.path_indices, vec![1]);
        assert!(tree.verify_proof(&fe(7), &[fe(5)], &[1]));
    }

    #[test]
    fn test_insert_returns_sequential_leaf_indices() {
        for depth in 0..=4u32 {
            let mut tree = SparseMerkleTree::new("seq", depth, poseidon()).unwrap();
            let first = (1u64 << depth) - 1;
            for k in 0..(1u64 << depth) {
                assert_eq!(tree.insert(fe(k + 100)).unwrap(), k + first);
                assert_eq!(tree.leaves_count(), k + 1);
            }
        }
    }

    #[test]
    fn test_tree_full() {
        let mut tree = SparseMerkleTree::new("full", 2, poseidon()).unwrap();
        for k in 0..4 {
            tree.insert(fe(k + 1)).unwrap();
        }
        let root = tree.root();
        assert_eq!(tree.insert(fe(9)), Err(SmtError::TreeFull { id: "full".into(), capacity: 4 }));
        assert_eq!(tree.leaves_count(), 4);
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_empty_root_is_top_default() {
        let hasher = poseidon();
        let tree = SparseMerkleTree::new("empty", 1, hasher.clone()).unwrap();
        let h = hasher.hash(&[FieldElement::ZERO]).unwrap();
        assert_eq!(tree.root(), hasher.hash_pair(&h, &h).unwrap());
        assert_eq!(tree.root(), tree.defaults()[0]);
        assert_eq!(tree.non_default_nodes(), 0);

        let deep = SparseMerkleTree::new("deep", 16, hasher).unwrap();
        assert_eq!(deep.root(), deep.defaults()[0]);
    }

    #[test]
    fn test_depth_limit() {
        assert!(matches!(
            SparseMerkleTree::new("huge", MAX_DEPTH + 1, poseidon()),
            Err(SmtError::DepthTooLarge { .. })
        ));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        let mut tree = SparseMerkleTree::new("proofs", 3, poseidon()).unwrap();
        let values: Vec<_> = (0..6).map(|k| fe(1000 + k)).collect();
        let indices: Vec<_> = values.iter().map(|v| tree.insert(*v).unwrap()).collect();

        for (index, value) in indices.iter().zip(&values) {
            let proof = tree.build_proof(*index).unwrap();
            assert_eq!(proof.siblings.len(), 3);
            assert!(tree.verify_proof(value, &proof.siblings, &proof.path_indices));
            assert!(proof.verify(tree.hasher(), &tree.root(), value));
        }
    }

    #[test]
    fn test_proof_tamper_sensitivity() {
        let mut tree = SparseMerkleTree::new("tamper", 3, poseidon()).unwrap();
        for k in 0..5 {
            tree.insert(fe(7 * k + 3)).unwrap();
        }
        let leaf_index = tree.leaf_node_index(2).unwrap();
        let value = fe(17);
        let proof = tree.build_proof(leaf_index).unwrap();
        assert!(tree.verify_proof(&value, &proof.siblings, &proof.path_indices));

        for i in 0..proof.siblings.len() {
            let mut siblings = proof.siblings.clone();
            siblings[i] = FieldElement::new(*siblings[i].as_u256() + alloy_primitives::U256::from(1u64));
            assert!(!tree.verify_proof(&value, &siblings, &proof.path_indices));

            let mut sides = proof.path_indices.clone();
            sides[i] ^= 1;
            assert!(!tree.verify_proof(&value, &proof.siblings, &sides));
        }
        assert!(!tree.verify_proof(&fe(18), &proof.siblings, &proof.path_indices));
        assert!(!tree.verify_proof(&value, &proof.siblings[1..], &proof.path_indices[1..]));
        assert!(!tree.verify_proof(&value, &proof.siblings, &[0, 2, 0]));
    }

    #[test]
    fn test_build_proof_rejects_non_leaf() {
        let tree = SparseMerkleTree::new("range", 2, poseidon()).unwrap();
        assert!(matches!(tree.build_proof(2), Err(SmtError::LeafOutOfRange { index: 2, depth: 2 })));
        assert!(matches!(tree.build_proof(7), Err(SmtError::LeafOutOfRange { .. })));
        assert!(tree.build_proof(6).is_ok());
        assert!(tree.leaf_node_index(4).is_err());
        assert_eq!(tree.leaf_node_index(3).unwrap(), 6);
    }

    #[test]
    fn test_default_leaf_insert_stores_nothing() {
        let hasher = poseidon();
        let mut tree = SparseMerkleTree::new("minimal", 3, hasher.clone()).unwrap();
        let empty_leaf = hasher.hash(&[FieldElement::ZERO]).unwrap();
        let empty_root = tree.root();

        let index = tree.insert(empty_leaf).unwrap();
        assert_eq!(index, 7);
        assert_eq!(tree.leaves_count(), 1);
        assert_eq!(tree.non_default_nodes(), 0);
        assert_eq!(tree.root(), empty_root);

        tree.insert(fe(42)).unwrap();
        // leaf 8 plus its three ancestors
        assert_eq!(tree.non_default_nodes(), 4);
        assert!(tree.snapshot().nodes.keys().all(|i| *i != 7));
    }

    #[test]
    fn test_ancestor_pruned_when_back_to_default() {
        // Mod 13, 5 + 8 folds back to the default 0
        let mut tree = SparseMerkleTree::new("prune", 1, additive(Some(13))).unwrap();
        tree.insert(fe(5)).unwrap();
        assert_eq!(tree.snapshot().nodes.get(&0), Some(&fe(5)));

        tree.insert(fe(8)).unwrap();
        assert_eq!(tree.root(), fe(0));
        let nodes = tree.snapshot().nodes;
        assert!(!nodes.contains_key(&0));
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_strict_insert_rejects_out_of_field() {
        let mut tree = SparseMerkleTree::new("strict", 2, poseidon()).unwrap();
        let p = FieldElement::new(crate::field::MODULUS);
        assert_eq!(tree.insert(p), Err(SmtError::FieldRange(p)));
        assert_eq!(tree.leaves_count(), 0);

        let mut lenient = SparseMerkleTree::new("warn", 2, FieldHasher::poseidon(FieldCheckMode::Warn)).unwrap();
        assert_eq!(lenient.insert(p).unwrap(), 3);
    }

    #[test]
    fn test_stage_then_apply_matches_insert() {
        let mut staged = SparseMerkleTree::new("a", 4, poseidon()).unwrap();
        let mut direct = SparseMerkleTree::new("a", 4, poseidon()).unwrap();
        for k in 0..5 {
            let update = staged.stage_insert(fe(k * 3 + 1)).unwrap();
            // Staging alone changes nothing
            assert_eq!(staged.leaves_count(), k);
            let expected_root = update.root();
            staged.apply(update).unwrap();
            direct.insert(fe(k * 3 + 1)).unwrap();
            assert_eq!(staged.root(), expected_root);
            assert_eq!(staged.root(), direct.root());
        }
    }

    #[test]
    fn test_stale_update_rejected() {
        let mut tree = SparseMerkleTree::new("stale", 2, poseidon()).unwrap();
        let first = tree.stage_insert(fe(1)).unwrap();
        let second = tree.stage_insert(fe(2)).unwrap();
        tree.apply(first).unwrap();
        assert!(matches!(tree.snapshot_after(&second), Err(SmtError::StaleUpdate { .. })));
        assert!(matches!(tree.apply(second), Err(SmtError::StaleUpdate { staged: 0, current: 1, .. })));
        assert_eq!(tree.leaves_count(), 1);
    }

    #[test]
    fn test_snapshot_after_matches_applied_snapshot() {
        let mut tree = SparseMerkleTree::new("preview", 3, poseidon()).unwrap();
        tree.insert(fe(11)).unwrap();
        let update = tree.stage_insert(fe(12)).unwrap();
        let preview = tree.snapshot_after(&update).unwrap();
        tree.apply(update).unwrap();
        assert_eq!(preview, tree.snapshot());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let hasher = poseidon();
        let mut tree = SparseMerkleTree::new("roundtrip", 5, hasher.clone()).unwrap();
        for k in 0..9 {
            tree.insert(fe(k * k + 2)).unwrap();
        }
        let json = serde_json::to_string(&tree.snapshot()).unwrap();
        let restored = SparseMerkleTree::from_snapshot(serde_json::from_str(&json).unwrap(), hasher).unwrap();

        assert_eq!(restored.id(), "roundtrip");
        assert_eq!(restored.depth(), tree.depth());
        assert_eq!(restored.leaves_count(), tree.leaves_count());
        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.snapshot(), tree.snapshot());

        // and keeps working
        let mut a = tree;
        let mut b = restored;
        a.insert(fe(99)).unwrap();
        b.insert(fe(99)).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_from_snapshot_validation() {
        let hasher = poseidon();
        let mut snapshot = SparseMerkleTree::new("bad", 2, hasher.clone()).unwrap().snapshot();
        snapshot.leaves_count = 5;
        assert!(matches!(
            SparseMerkleTree::from_snapshot(snapshot.clone(), hasher.clone()),
            Err(SmtError::InvalidSnapshot { .. })
        ));

        snapshot.leaves_count = 1;
        snapshot.nodes.insert(7, fe(1));
        assert!(matches!(
            SparseMerkleTree::from_snapshot(snapshot.clone(), hasher.clone()),
            Err(SmtError::InvalidSnapshot { .. })
        ));

        snapshot.nodes.clear();
        snapshot.nodes.insert(5, fe(1));
        assert!(matches!(
            SparseMerkleTree::from_snapshot(snapshot.clone(), hasher.clone()),
            Err(SmtError::InvalidSnapshot { .. })
        ));

        snapshot.nodes.clear();
        snapshot.nodes.insert(3, FieldElement::new(crate::field::MODULUS));
        assert!(matches!(SparseMerkleTree::from_snapshot(snapshot, hasher), Err(SmtError::FieldRange(_))));
    }

    #[test]
    fn test_from_snapshot_drops_default_entries() {
        let hasher = poseidon();
        let tree = SparseMerkleTree::new("defaults", 2, hasher.clone()).unwrap();
        let mut snapshot = tree.snapshot();
        snapshot.leaves_count = 1;
        snapshot.nodes.insert(3, tree.defaults()[2]);
        let restored = SparseMerkleTree::from_snapshot(snapshot, hasher).unwrap();
        assert_eq!(restored.non_default_nodes(), 0);
    }
}
