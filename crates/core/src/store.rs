//! Persistence seam for trees and the nullifier ledger

use registry_smt::{FieldElement, FieldHasher, SparseMerkleTree, TreeSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::RegistryError;
use crate::types::{Groth16Proof, PublicSignals, Registration};

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or ledger entry could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Ledger already holds an entry for this nullifier
    #[error("nullifier {0} already recorded")]
    DuplicateNullifier(FieldElement),

    /// The ledger entry is durable but a tree snapshot is not
    #[error("commit for nullifier {nullifier} was only partly written: {reason}")]
    Torn {
        /// Nullifier of the torn commit
        nullifier: FieldElement,
        /// What failed after the ledger entry landed
        reason: String,
    },
}

/// One accepted registration, as kept in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Key of the entry
    pub nullifier: FieldElement,
    /// Proof as submitted
    pub proof: Groth16Proof,
    /// All public signals, including unconsumed ones
    pub public_signals: PublicSignals,
}

impl From<&Registration> for LedgerEntry {
    fn from(registration: &Registration) -> Self {
        Self {
            nullifier: registration.nullifier,
            proof: registration.proof.clone(),
            public_signals: registration.public_signals.clone(),
        }
    }
}

/// Everything one registration writes: a ledger entry plus the post-insert
/// snapshots of both trees.
#[derive(Clone, Debug)]
pub struct RegistrationCommit {
    /// New ledger entry
    pub entry: LedgerEntry,
    /// Snapshots of every tree after the insert
    pub trees: Vec<TreeSnapshot>,
}

/// Durable home of tree snapshots and ledger entries.
pub trait RegistryStore: Send + Sync {
    /// Latest snapshot of tree `id`, if one was ever saved.
    fn load_tree(&self, id: &str) -> Result<Option<TreeSnapshot>, StoreError>;

    /// Overwrite the snapshot of `snapshot.id`.
    fn save_tree(&self, snapshot: &TreeSnapshot) -> Result<(), StoreError>;

    /// Whether the ledger holds `nullifier`.
    fn ledger_contains(&self, nullifier: &FieldElement) -> Result<bool, StoreError>;

    /// Record a new entry. Never overwrites: an existing nullifier is
    /// [`StoreError::DuplicateNullifier`].
    fn ledger_append(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Number of ledger entries
    fn ledger_len(&self) -> Result<u64, StoreError>;

    /// Write a ledger entry and its tree snapshots as one unit.
    ///
    /// On error nothing is visible, unless the error is
    /// [`StoreError::Torn`].
    fn commit(&self, commit: &RegistrationCommit) -> Result<(), StoreError>;

    /// Ids of all stored trees
    fn tree_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Load tree `id` from `store`, or create it empty and persist it.
pub fn load_or_create(
    store: &dyn RegistryStore,
    id: &str,
    depth: u32,
    hasher: FieldHasher,
) -> Result<SparseMerkleTree, RegistryError> {
    match store.load_tree(id)? {
        Some(snapshot) => {
            if snapshot.id != id {
                return Err(RegistryError::Inconsistent(format!(
                    "snapshot stored for tree {id:?} names tree {:?}",
                    snapshot.id
                )));
            }
            if snapshot.depth != depth {
                return Err(RegistryError::Inconsistent(format!(
                    "tree {id:?} is stored with depth {}, configured depth is {depth}",
                    snapshot.depth
                )));
            }
            let tree = SparseMerkleTree::from_snapshot(snapshot, hasher)?;
            info!(tree = id, depth, leaves = tree.leaves_count(), "loaded tree");
            Ok(tree)
        }
        None => {
            let tree = SparseMerkleTree::new(id, depth, hasher)?;
            store.save_tree(&tree.snapshot())?;
            info!(tree = id, depth, "created tree");
            Ok(tree)
        }
    }
}
