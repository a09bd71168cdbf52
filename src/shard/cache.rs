use super::store::{IndexStore, ShardSearcher};
use super::types::ShardId;
use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Shared cache of open shard searchers, bounded by `max_open_shards`.
///
/// One instance is shared by all concurrent search tasks on a node; the
/// least recently used searcher is evicted under capacity pressure. Owned and
/// injected explicitly; there is no ambient static state.
pub struct SearcherCache {
    store: Arc<IndexStore>,
    searchers: Mutex<LruCache<ShardId, Arc<ShardSearcher>>>,
}

impl SearcherCache {
    pub fn new(store: Arc<IndexStore>, max_open_shards: usize) -> Arc<Self> {
        let capacity = NonZeroUsize::new(max_open_shards).unwrap_or(NonZeroUsize::MIN);
        Arc::new(Self {
            store,
            searchers: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Returns an open searcher for the shard, opening and caching one if
    /// needed. Failures (missing/corrupt shard) are not cached.
    pub fn get(&self, shard_id: ShardId) -> Result<Arc<ShardSearcher>> {
        if let Some(searcher) = self.searchers.lock().get(&shard_id) {
            return Ok(searcher.clone());
        }

        let searcher = self.store.open_searcher(shard_id)?;
        self.searchers.lock().put(shard_id, searcher.clone());
        Ok(searcher)
    }

    pub fn open_count(&self) -> usize {
        self.searchers.lock().len()
    }
}
