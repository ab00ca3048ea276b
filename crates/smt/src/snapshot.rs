//! Persisted tree format

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::field::FieldElement;

/// Everything needed to rebuild a tree: id, depth, leaf count and the
/// non-default nodes.
///
/// In JSON the node map is an object keyed by node index, with values as
/// decimal strings so large integers survive any JSON reader:
///
/// ```json
/// { "id": "identity", "depth": 2, "leavesCount": 1, "nodes": { "0": "123", "3": "7" } }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    /// Tree id, unique per store
    pub id: String,
    /// Fixed depth
    pub depth: u32,
    /// Inserted leaves
    pub leaves_count: u64,
    /// Non-default nodes by index
    pub nodes: BTreeMap<u64, FieldElement>,
}
