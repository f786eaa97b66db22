// src/ct_log/types.rs
use serde::{Deserialize, Serialize};

/// Response from CT log's get-sth endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

/// Single entry from CT log's get-entries endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogEntry {
    pub leaf_input: String, // base64-encoded MerkleTreeLeaf
    #[serde(default)]
    pub extra_data: Option<String>, // base64-encoded chain, precert payload for type 1
}

/// Response wrapper for get-entries endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct GetEntriesResponse {
    #[serde(default)]
    pub entries: Vec<RawLogEntry>,
}

/// One log position, with the global index assigned by the crawler's cursor
#[derive(Debug, Clone)]
pub struct LeafEntry {
    pub index: u64,
    pub leaf_input: String,
    pub extra_data: Option<String>,
}

impl LeafEntry {
    pub fn from_raw(index: u64, raw: RawLogEntry) -> Self {
        Self {
            index,
            leaf_input: raw.leaf_input,
            extra_data: raw.extra_data,
        }
    }
}
