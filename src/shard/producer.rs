use super::cache::SearcherCache;
use super::types::{ShardFormatVersion, ShardId};
use crate::query::compile::CompiledQuery;
use crate::query::field_index::RawRow;
use crate::query::types::Query;
use crate::task::context::TaskContext;
use crate::task::errors::ErrorQueue;
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Searches assigned shards and feeds matched raw rows into the bounded
/// transfer queue.
///
/// Shards are processed in the order given (the coordinator orders them
/// newest first) with parallelism capped by `max_tasks`. When the queue is
/// full `send` blocks, giving natural backpressure; rows are never dropped.
/// A failure on one shard is reported and the remaining shards still run.
pub struct ShardSearchProducer {
    ctx: TaskContext,
    cache: Arc<SearcherCache>,
    shard_ids: Vec<ShardId>,
    query: Arc<Query>,
    max_clause_count: usize,
    /// Stored field name to row slot, with the total row width.
    field_slots: Arc<Vec<(String, usize)>>,
    row_width: usize,
    errors: ErrorQueue,
    hit_count: Arc<AtomicU64>,
    remaining: Arc<AtomicUsize>,
    max_tasks: usize,
    /// One compiled query per shard format version, for the life of this task.
    compiled: Mutex<HashMap<ShardFormatVersion, Arc<CompiledQuery>>>,
}

impl ShardSearchProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: TaskContext,
        cache: Arc<SearcherCache>,
        shard_ids: Vec<ShardId>,
        query: Arc<Query>,
        max_clause_count: usize,
        field_slots: Arc<Vec<(String, usize)>>,
        row_width: usize,
        errors: ErrorQueue,
        hit_count: Arc<AtomicU64>,
        max_tasks: usize,
    ) -> Arc<Self> {
        let remaining = Arc::new(AtomicUsize::new(shard_ids.len()));
        Arc::new(Self {
            ctx,
            cache,
            shard_ids,
            query,
            max_clause_count,
            field_slots,
            row_width,
            errors,
            hit_count,
            remaining,
            max_tasks,
            compiled: Mutex::new(HashMap::new()),
        })
    }

    /// Number of shards not yet fully searched, for progress reporting.
    pub fn remaining_shards(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Searches all assigned shards. Consumes `tx` so the transfer queue
    /// closes once every shard task has finished, which is how the consumer
    /// observes completion without a sentinel.
    pub async fn run(self: Arc<Self>, tx: mpsc::Sender<RawRow>) {
        let semaphore = Arc::new(Semaphore::new(self.max_tasks.max(1)));
        let mut tasks = JoinSet::new();

        for shard_id in self.shard_ids.clone() {
            if self.ctx.is_terminated() {
                break;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let producer = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                producer.search_shard(shard_id, tx).await;
                producer.remaining.fetch_sub(1, Ordering::AcqRel);
                drop(permit);
            });
        }

        drop(tx);
        while tasks.join_next().await.is_some() {}
    }

    async fn search_shard(&self, shard_id: ShardId, tx: mpsc::Sender<RawRow>) {
        tracing::debug!("Searching shard {}", shard_id.0);

        let searcher = match self.cache.get(shard_id) {
            Ok(searcher) => searcher,
            Err(e) => {
                self.errors.push(format!("Shard {}: {}", shard_id.0, e));
                return;
            }
        };

        let compiled = match self.compiled_query(searcher.shard().format_version) {
            Ok(compiled) => compiled,
            Err(e) => {
                self.errors
                    .push(format!("Shard {}: failed to compile query: {}", shard_id.0, e));
                return;
            }
        };

        for document in searcher.documents() {
            if self.ctx.is_terminated() {
                return;
            }

            if compiled.matches(&document.fields) {
                self.hit_count.fetch_add(1, Ordering::Relaxed);

                let mut row: RawRow = vec![None; self.row_width];
                for (field, slot) in self.field_slots.iter() {
                    row[*slot] = document.fields.get(field).cloned();
                }

                // Blocks when the queue is full; backpressure, never dropped.
                if tx.send(row).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Compiles the query for a shard format version the first time that
    /// version is seen by this task, reusing it for later shards.
    fn compiled_query(&self, version: ShardFormatVersion) -> Result<Arc<CompiledQuery>> {
        let mut compiled = self.compiled.lock();
        if let Some(existing) = compiled.get(&version) {
            return Ok(existing.clone());
        }

        let query = Arc::new(CompiledQuery::compile(
            &self.query.expression,
            &self.query.params,
            self.max_clause_count,
        )?);
        compiled.insert(version, query.clone());
        Ok(query)
    }
}
