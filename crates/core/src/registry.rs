//! Commitment registry
//!
//! Owns the identity and eligibility trees and the nullifier ledger. Every
//! accepted registration appends one leaf to each tree at the same position
//! and records its nullifier, all through a single store commit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use registry_smt::{FieldHasher, HashBackend, SparseMerkleTree};
use tracing::{error, info, warn};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::store::{load_or_create, LedgerEntry, RegistrationCommit, RegistryStore, StoreError};
use crate::types::{MerklePath, Registration, Submission, SubmitReceipt, TreeInfo};
use crate::verifier::ProofVerifier;

/// The two trees a registry keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeKind {
    /// Identity commitments (public signal 0)
    Identity,
    /// Eligibility commitments (public signal 1)
    Eligibility,
}

struct TreePair {
    identity: SparseMerkleTree,
    eligibility: SparseMerkleTree,
}

impl TreePair {
    const fn get(&self, kind: TreeKind) -> &SparseMerkleTree {
        match kind {
            TreeKind::Identity => &self.identity,
            TreeKind::Eligibility => &self.eligibility,
        }
    }
}

/// Shared registry state. Build once and hand out behind an `Arc`.
pub struct Registry {
    config: RegistryConfig,
    store: Arc<dyn RegistryStore>,
    hasher: FieldHasher,
    trees: RwLock<TreePair>,
    /// Serializes submissions end to end
    writer: Mutex<()>,
    /// Cleared when a commit is torn; writes are refused afterwards
    trusted: AtomicBool,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("hasher", &self.hasher)
            .field("leaves_count", &self.leaves_count())
            .field("trusted", &self.is_trusted())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Load or create both trees and check that they agree with each other
    /// and with the ledger.
    pub fn open(
        config: RegistryConfig,
        store: Arc<dyn RegistryStore>,
        backend: Arc<dyn HashBackend>,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        let hasher = FieldHasher::new(backend, config.field_check_mode);

        let identity = load_or_create(store.as_ref(), &config.identity_tree_id, config.depth, hasher.clone())?;
        let eligibility = load_or_create(store.as_ref(), &config.eligibility_tree_id, config.depth, hasher.clone())?;

        if identity.leaves_count() != eligibility.leaves_count() {
            return Err(RegistryError::Inconsistent(format!(
                "tree {:?} has {} leaves but tree {:?} has {}",
                identity.id(),
                identity.leaves_count(),
                eligibility.id(),
                eligibility.leaves_count()
            )));
        }
        let ledger_len = store.ledger_len()?;
        if ledger_len != identity.leaves_count() {
            return Err(RegistryError::Inconsistent(format!(
                "ledger holds {ledger_len} nullifiers but trees hold {} leaves",
                identity.leaves_count()
            )));
        }

        info!(
            identity = %identity.id(),
            eligibility = %eligibility.id(),
            depth = config.depth,
            leaves = identity.leaves_count(),
            nullifiers = ledger_len,
            hash = hasher.backend_name(),
            field_check = %config.field_check_mode,
            "registry opened"
        );

        Ok(Self {
            config,
            store,
            hasher,
            trees: RwLock::new(TreePair { identity, eligibility }),
            writer: Mutex::new(()),
            trusted: AtomicBool::new(true),
        })
    }

    /// Configuration the registry was opened with
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Hasher shared by both trees
    pub const fn hasher(&self) -> &FieldHasher {
        &self.hasher
    }

    /// Resolve a tree name.
    pub fn tree_kind(&self, tree_id: &str) -> Result<TreeKind, RegistryError> {
        if tree_id == self.config.identity_tree_id {
            Ok(TreeKind::Identity)
        } else if tree_id == self.config.eligibility_tree_id {
            Ok(TreeKind::Eligibility)
        } else {
            Err(RegistryError::InvalidTreeId(tree_id.to_string()))
        }
    }

    /// Verify the proof of `submission`, then record it.
    pub fn register(
        &self,
        verifier: &dyn ProofVerifier,
        submission: Submission,
    ) -> Result<SubmitReceipt, RegistryError> {
        let registration = Registration::from_submission(submission)?;
        match verifier.verify(&registration.proof, &registration.public_signals) {
            Ok(true) => {}
            Ok(false) => {
                warn!(nullifier = %registration.nullifier, verifier = verifier.name(), "proof rejected");
                return Err(RegistryError::ProofVerificationFailed);
            }
            Err(e) => return Err(RegistryError::Verifier(format!("{e:#}"))),
        }
        self.submit(&registration)
    }

    /// Record an already verified registration.
    ///
    /// Both leaves are staged against the current trees, written to the
    /// store in one commit, and only then applied in memory. Any failure
    /// before the commit leaves no trace.
    pub fn submit(&self, registration: &Registration) -> Result<SubmitReceipt, RegistryError> {
        for value in [
            &registration.identity_commitment,
            &registration.eligibility_commitment,
            &registration.nullifier,
        ] {
            self.hasher.check(value)?;
        }

        let _writer = self.writer.lock();
        if !self.is_trusted() {
            return Err(RegistryError::Untrusted);
        }
        if self.store.ledger_contains(&registration.nullifier)? {
            return Err(RegistryError::DuplicateNullifier(registration.nullifier));
        }

        let (commit, identity_update, eligibility_update) = {
            let trees = self.trees.read();
            let identity_update = trees.identity.stage_insert(registration.identity_commitment)?;
            let eligibility_update = trees.eligibility.stage_insert(registration.eligibility_commitment)?;
            let commit = RegistrationCommit {
                entry: LedgerEntry::from(registration),
                trees: vec![
                    trees.identity.snapshot_after(&identity_update)?,
                    trees.eligibility.snapshot_after(&eligibility_update)?,
                ],
            };
            (commit, identity_update, eligibility_update)
        };

        if let Err(e) = self.store.commit(&commit) {
            if matches!(e, StoreError::Torn { .. }) {
                self.trusted.store(false, Ordering::SeqCst);
                error!(nullifier = %registration.nullifier, error = %e, "registry marked untrusted");
            }
            return Err(e.into());
        }

        let receipt = SubmitReceipt {
            identity_index: identity_update.leaves_count() - 1,
            eligibility_index: eligibility_update.leaves_count() - 1,
            identity_root: identity_update.root(),
            eligibility_root: eligibility_update.root(),
        };

        let mut trees = self.trees.write();
        let applied = trees
            .identity
            .apply(identity_update)
            .and_then(|()| trees.eligibility.apply(eligibility_update));
        if let Err(e) = applied {
            // durable state moved on without us
            self.trusted.store(false, Ordering::SeqCst);
            error!(error = %e, "committed registration could not be applied in memory");
            return Err(e.into());
        }
        drop(trees);

        info!(
            nullifier = %registration.nullifier,
            index = receipt.identity_index,
            identity_root = %receipt.identity_root.to_hex(),
            eligibility_root = %receipt.eligibility_root.to_hex(),
            "registration accepted"
        );
        Ok(receipt)
    }

    /// Inclusion path for `position` in tree `tree_id`.
    ///
    /// Positions not filled yet return the path of the empty leaf.
    pub fn get_path(&self, tree_id: &str, position: u64) -> Result<MerklePath, RegistryError> {
        let kind = self.tree_kind(tree_id)?;
        let trees = self.trees.read();
        let tree = trees.get(kind);
        if position >= tree.capacity() {
            return Err(RegistryError::LeafOutOfRange { position, depth: tree.depth() });
        }
        let proof = tree.build_proof(tree.leaf_node_index(position)?)?;
        Ok(MerklePath {
            leaf_index: position,
            path: proof.siblings,
            path_indices: proof.path_indices,
            root: tree.root(),
        })
    }

    /// Root, depth and leaf count of tree `tree_id`.
    pub fn get_root(&self, tree_id: &str) -> Result<TreeInfo, RegistryError> {
        let kind = self.tree_kind(tree_id)?;
        let trees = self.trees.read();
        let tree = trees.get(kind);
        Ok(TreeInfo { root: tree.root(), depth: tree.depth(), leaves_count: tree.leaves_count() })
    }

    /// Registrations accepted so far (both trees hold this many leaves).
    pub fn leaves_count(&self) -> u64 {
        self.trees.read().identity.leaves_count()
    }

    /// Number of recorded nullifiers
    pub fn ledger_len(&self) -> Result<u64, RegistryError> {
        Ok(self.store.ledger_len()?)
    }

    /// False once a commit was torn; the process must restart.
    pub fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }
}
