//! Directory-backed store
//!
//! Layout under the root directory:
//! - `trees/<id>.json`: latest snapshot of each tree
//! - `ledger/<nullifier>.json`: one file per accepted registration
//!
//! Snapshots are replaced by writing a temp file, syncing it and renaming it
//! over the old one. Ledger files are created exclusively and never
//! rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use registry_smt::{FieldElement, TreeSnapshot};
use tracing::{debug, error, warn};

use crate::store::{LedgerEntry, RegistrationCommit, RegistryStore, StoreError};

const TREES_DIR: &str = "trees";
const LEDGER_DIR: &str = "ledger";
const EXTENSION: &str = "json";

/// JSON files in a data directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(TREES_DIR))?;
        fs::create_dir_all(root.join(LEDGER_DIR))?;
        Ok(Self { root })
    }

    /// Data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tree_path(&self, id: &str) -> PathBuf {
        self.root.join(TREES_DIR).join(format!("{id}.{EXTENSION}"))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.root.join(TREES_DIR).join(format!(".{id}.{EXTENSION}.tmp"))
    }

    fn ledger_path(&self, nullifier: &FieldElement) -> PathBuf {
        self.root.join(LEDGER_DIR).join(format!("{nullifier}.{EXTENSION}"))
    }

    /// Read back one ledger entry.
    pub fn ledger_entry(&self, nullifier: &FieldElement) -> Result<Option<LedgerEntry>, StoreError> {
        match fs::read(self.ledger_path(nullifier)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize `snapshot` into its synced temp file and return the path.
    fn write_temp(&self, snapshot: &TreeSnapshot) -> Result<PathBuf, StoreError> {
        let path = self.temp_path(&snapshot.id);
        let bytes = serde_json::to_vec(snapshot)?;
        let mut file = File::create(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Create the ledger file for `entry`; fails if it already exists.
    fn create_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let path = self.ledger_path(&entry.nullifier);
        let bytes = serde_json::to_vec(entry)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::DuplicateNullifier(entry.nullifier));
            }
            Err(e) => return Err(e.into()),
        };
        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        if let Err(e) = written {
            // a half-written entry would block the nullifier forever
            remove_leftover(&path, "ledger entry");
            return Err(e.into());
        }
        sync_dir(&self.root.join(LEDGER_DIR));
        Ok(())
    }

    fn discard_temps(temps: &[PathBuf]) {
        for temp in temps {
            remove_leftover(temp, "temp snapshot");
        }
    }
}

/// Remove a partial file, logging any failure. Returns whether `path` is gone.
fn remove_leftover(path: &Path, what: &str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove {what}");
            false
        }
    }
}

impl RegistryStore for FileStore {
    fn load_tree(&self, id: &str) -> Result<Option<TreeSnapshot>, StoreError> {
        match fs::read(self.tree_path(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_tree(&self, snapshot: &TreeSnapshot) -> Result<(), StoreError> {
        let temp = self.write_temp(snapshot)?;
        if let Err(e) = fs::rename(&temp, self.tree_path(&snapshot.id)) {
            Self::discard_temps(&[temp]);
            return Err(e.into());
        }
        sync_dir(&self.root.join(TREES_DIR));
        Ok(())
    }

    fn ledger_contains(&self, nullifier: &FieldElement) -> Result<bool, StoreError> {
        Ok(self.ledger_path(nullifier).try_exists()?)
    }

    fn ledger_append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.create_entry(entry)
    }

    fn ledger_len(&self) -> Result<u64, StoreError> {
        let mut count = 0;
        for dir_entry in fs::read_dir(self.root.join(LEDGER_DIR))? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn commit(&self, commit: &RegistrationCommit) -> Result<(), StoreError> {
        let mut temps = Vec::with_capacity(commit.trees.len());
        for snapshot in &commit.trees {
            match self.write_temp(snapshot) {
                Ok(temp) => temps.push(temp),
                Err(e) => {
                    Self::discard_temps(&temps);
                    return Err(e);
                }
            }
        }

        // commit point
        if let Err(e) = self.create_entry(&commit.entry) {
            Self::discard_temps(&temps);
            return Err(e);
        }

        for (temp, snapshot) in temps.iter().zip(&commit.trees) {
            if let Err(e) = fs::rename(temp, self.tree_path(&snapshot.id)) {
                error!(
                    nullifier = %commit.entry.nullifier,
                    tree = %snapshot.id,
                    error = %e,
                    "ledger entry written but tree snapshot was not"
                );
                return Err(StoreError::Torn {
                    nullifier: commit.entry.nullifier,
                    reason: format!("renaming snapshot of tree {:?}: {e}", snapshot.id),
                });
            }
        }
        sync_dir(&self.root.join(TREES_DIR));
        debug!(nullifier = %commit.entry.nullifier, trees = commit.trees.len(), "registration committed");
        Ok(())
    }

    fn tree_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for dir_entry in fs::read_dir(self.root.join(TREES_DIR))? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !stem.starts_with('.') {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Persist directory entries (renames, creates). Best effort.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(path = %dir.display(), error = %e, "failed to sync directory");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
