use crate::node::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifies one index shard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ShardId(pub u64);

/// On-disk format version of a shard. Query compilation is cached per
/// version within one node task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ShardFormatVersion(pub u32);

/// Lifecycle status of a shard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShardStatus {
    Active,
    Corrupt,
    Deleted,
}

/// A named, versioned partition of an index, owned by exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexShard {
    pub id: ShardId,
    pub index_uuid: Uuid,
    pub node: NodeId,
    /// Time-based partition name; searches run newest partition first.
    pub partition: String,
    pub status: ShardStatus,
    pub format_version: ShardFormatVersion,
}

/// Index metadata: the fields of every document plus which are stored
/// (retrievable per match) rather than indexed-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub uuid: Uuid,
    pub name: String,
    pub stored_fields: Vec<String>,
}

/// One indexed document as the searcher sees it: a bag of named field values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub fields: HashMap<String, String>,
}

impl Document {
    pub fn new(fields: impl IntoIterator<Item = (&'static str, String)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }
}
