//! Commitment registry core
//!
//! This crate ties the identity and eligibility trees to the nullifier
//! ledger:
//! - `registry`: the shared registry object and its submit/query operations
//! - `store`: persistence seam, with file and in-memory implementations
//! - `types`: proof payloads, public signals and query results
//! - `verifier`: proof verification seam

pub mod config;
pub mod error;
pub mod file_store;
pub mod memory_store;
pub mod registry;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod verifier;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use registry::{Registry, TreeKind};
pub use store::{load_or_create, LedgerEntry, RegistrationCommit, RegistryStore, StoreError};
pub use types::{Groth16Proof, MerklePath, PublicSignals, Registration, Submission, SubmitReceipt, TreeInfo};
pub use verifier::ProofVerifier;
