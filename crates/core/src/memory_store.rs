//! In-process store

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use registry_smt::{FieldElement, TreeSnapshot};

use crate::store::{LedgerEntry, RegistrationCommit, RegistryStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    trees: HashMap<String, TreeSnapshot>,
    ledger: BTreeMap<FieldElement, LedgerEntry>,
}

/// Store that keeps everything in memory. Commits are atomic because they
/// happen under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Read back one ledger entry.
    pub fn ledger_entry(&self, nullifier: &FieldElement) -> Option<LedgerEntry> {
        self.inner.lock().ledger.get(nullifier).cloned()
    }
}

impl RegistryStore for MemoryStore {
    fn load_tree(&self, id: &str) -> Result<Option<TreeSnapshot>, StoreError> {
        Ok(self.inner.lock().trees.get(id).cloned())
    }

    fn save_tree(&self, snapshot: &TreeSnapshot) -> Result<(), StoreError> {
        self.inner.lock().trees.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn ledger_contains(&self, nullifier: &FieldElement) -> Result<bool, StoreError> {
        Ok(self.inner.lock().ledger.contains_key(nullifier))
    }

    fn ledger_append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.ledger.contains_key(&entry.nullifier) {
            return Err(StoreError::DuplicateNullifier(entry.nullifier));
        }
        inner.ledger.insert(entry.nullifier, entry.clone());
        Ok(())
    }

    fn ledger_len(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().ledger.len() as u64)
    }

    fn commit(&self, commit: &RegistrationCommit) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.ledger.contains_key(&commit.entry.nullifier) {
            return Err(StoreError::DuplicateNullifier(commit.entry.nullifier));
        }
        inner.ledger.insert(commit.entry.nullifier, commit.entry.clone());
        for snapshot in &commit.trees {
            inner.trees.insert(snapshot.id.clone(), snapshot.clone());
        }
        Ok(())
    }

    fn tree_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.inner.lock().trees.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
