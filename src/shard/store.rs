use super::types::{Document, Index, IndexShard, ShardId, ShardStatus};
use anyhow::{anyhow, Result};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Injected service holding index metadata and shard contents.
///
/// Stands in for the out-of-scope shard persistence layer: the coordinator
/// reads shard metadata from it to partition work, and node tasks open
/// searchers through it. Backed by `DashMap` so concurrent searches and
/// metadata updates do not contend on one lock.
#[derive(Default)]
pub struct IndexStore {
    indexes: DashMap<Uuid, Index>,
    shards: DashMap<ShardId, IndexShard>,
    documents: DashMap<ShardId, Arc<Vec<Document>>>,
}

impl IndexStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_index(&self, index: Index) {
        self.indexes.insert(index.uuid, index);
    }

    pub fn add_shard(&self, shard: IndexShard, documents: Vec<Document>) {
        self.documents.insert(shard.id, Arc::new(documents));
        self.shards.insert(shard.id, shard);
    }

    pub fn index(&self, uuid: &Uuid) -> Option<Index> {
        self.indexes.get(uuid).map(|entry| entry.value().clone())
    }

    /// All shard metadata for an index, regardless of status.
    pub fn shards_for_index(&self, uuid: &Uuid) -> Vec<IndexShard> {
        self.shards
            .iter()
            .filter(|entry| &entry.value().index_uuid == uuid)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Opens a searcher over one shard. Fails for unknown or corrupt shards.
    pub fn open_searcher(&self, shard_id: ShardId) -> Result<Arc<ShardSearcher>> {
        let shard = self
            .shards
            .get(&shard_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow!("Index shard {} does not exist", shard_id.0))?;

        if shard.status == ShardStatus::Corrupt {
            return Err(anyhow!("Index shard {} is corrupt", shard_id.0));
        }
        if shard.status == ShardStatus::Deleted {
            return Err(anyhow!("Index shard {} has been deleted", shard_id.0));
        }

        let documents = self
            .documents
            .get(&shard_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow!("Index shard {} has no data", shard_id.0))?;

        Ok(Arc::new(ShardSearcher { shard, documents }))
    }
}

/// An open handle over one shard's documents.
///
/// Opening is the expensive step (hence the searcher cache); iteration is a
/// cheap scan over the shared document slice.
#[derive(Debug)]
pub struct ShardSearcher {
    shard: IndexShard,
    documents: Arc<Vec<Document>>,
}

impl ShardSearcher {
    pub fn shard(&self) -> &IndexShard {
        &self.shard
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}
