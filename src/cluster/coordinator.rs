use super::collector::ClusterResultCollector;
use super::dispatch::SearchDispatcher;
use crate::config::SearchConfig;
use crate::coprocessor::types::{CoprocessorKey, CoprocessorSettings};
use crate::node::registry::NodeRegistry;
use crate::node::types::NodeId;
use crate::query::types::Query;
use crate::shard::types::{ShardId, ShardStatus};
use crate::shard::store::IndexStore;
use crate::task::types::now_ms;
use crate::worker::types::NodeSearchTask;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Source-node entry point for a cluster search.
///
/// Resolves target nodes, partitions the index's shards by owning node,
/// dispatches one search task per node and then polls until the search
/// completes, is terminated, or exits early, broadcasting termination to all
/// nodes on the way out.
pub struct ClusterSearchCoordinator {
    local_node: NodeId,
    registry: Arc<NodeRegistry>,
    index_store: Arc<IndexStore>,
    dispatcher: Arc<dyn SearchDispatcher>,
    config: SearchConfig,
}

impl ClusterSearchCoordinator {
    pub fn new(
        local_node: NodeId,
        registry: Arc<NodeRegistry>,
        index_store: Arc<IndexStore>,
        dispatcher: Arc<dyn SearchDispatcher>,
        config: SearchConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            registry,
            index_store,
            dispatcher,
            config,
        })
    }

    /// Starts the search: fans the work out across the cluster and spawns the
    /// poll loop that supervises it. Returns as soon as dispatch is done;
    /// results stream into the collector asynchronously.
    pub fn start(
        self: &Arc<Self>,
        query: Query,
        coprocessors: HashMap<CoprocessorKey, CoprocessorSettings>,
        collector: Arc<ClusterResultCollector>,
    ) {
        tracing::info!("Starting cluster search {}", collector.query_key());

        if let Err(e) = self.dispatch_all(&query, &coprocessors, &collector) {
            collector.record_node_error(&self.local_node, e.to_string());
            collector.force_complete();
            return;
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.poll_until_done(collector).await;
        });
    }

    /// Partitions shards by owning node and dispatches one task per node.
    /// Returns an error only for setup failures that doom the whole search.
    fn dispatch_all(
        &self,
        query: &Query,
        coprocessors: &HashMap<CoprocessorKey, CoprocessorSettings>,
        collector: &Arc<ClusterResultCollector>,
    ) -> Result<()> {
        if coprocessors.is_empty() {
            return Err(anyhow!("No result components have been requested"));
        }

        let targets = self.registry.target_nodes();
        if targets.is_empty() {
            return Err(anyhow!("No search nodes are enabled and active"));
        }

        let index = self
            .index_store
            .index(&query.data_source.uuid)
            .ok_or_else(|| {
                anyhow!(
                    "Search index '{}' could not be loaded",
                    query.data_source.name
                )
            })?;

        // Newest data first: higher partitions, then higher shard ids.
        let mut shards = self.index_store.shards_for_index(&query.data_source.uuid);
        shards.retain(|shard| shard.status != ShardStatus::Deleted);
        shards.sort_by(|a, b| {
            b.partition
                .cmp(&a.partition)
                .then_with(|| b.id.0.cmp(&a.id.0))
        });

        let mut by_node: HashMap<NodeId, Vec<ShardId>> = HashMap::new();
        let mut node_order: Vec<NodeId> = Vec::new();
        for shard in shards {
            if shard.status == ShardStatus::Corrupt {
                // Corrupt shards are reported, never searched.
                collector.record_node_error(
                    &shard.node,
                    format!("Index shard {} is corrupt and was skipped", shard.id.0),
                );
                continue;
            }
            let slot = by_node.entry(shard.node.clone()).or_insert_with(|| {
                node_order.push(shard.node.clone());
                Vec::new()
            });
            slot.push(shard.id);
        }

        // Register every eligible node before the first dispatch. A node that
        // answers with a complete result while dispatch is still in flight
        // must not drive the remaining count to zero ahead of the nodes not
        // yet registered, or their results would be rejected as late.
        let mut dispatchable: Vec<(NodeId, Vec<ShardId>)> = Vec::new();
        for node in node_order {
            if !targets.contains(&node) {
                collector.record_node_error(
                    &node,
                    "Node is not enabled or active, results may be missing",
                );
                continue;
            }
            let shard_ids = by_node.remove(&node).unwrap_or_default();
            collector.expect_node(node.clone());
            dispatchable.push((node, shard_ids));
        }

        if dispatchable.is_empty() {
            tracing::info!(
                "Search {} has no shards to search, completing immediately",
                collector.query_key()
            );
            collector.force_complete();
            return Ok(());
        }

        for (node, shard_ids) in dispatchable {
            tracing::info!(
                "Dispatching {} shard(s) of search {} to node {}",
                shard_ids.len(),
                collector.query_key(),
                node
            );

            let task = NodeSearchTask {
                query_key: collector.query_key().clone(),
                ancestor_task_id: collector.task_ctx().id().clone(),
                source_node: self.local_node.clone(),
                target_node: node.clone(),
                query: query.clone(),
                shard_ids,
                stored_fields: index.stored_fields.clone(),
                result_send_frequency_ms: self.config.result_send_frequency_ms,
                coprocessors: coprocessors.clone(),
                date_time_locale: "UTC".to_string(),
                now_epoch_ms: now_ms(),
            };
            self.dispatcher.dispatch(&node, task, collector.clone());
        }
        Ok(())
    }

    /// Supervises a running search: exits (broadcasting cluster termination)
    /// on cancellation, completion or the find-N early exit, and fails nodes
    /// that have gone silent past the liveness timeout.
    async fn poll_until_done(&self, collector: Arc<ClusterResultCollector>) {
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        loop {
            let done = collector.await_completion_timeout(interval).await;

            if collector.task_ctx().is_terminated() {
                tracing::info!("Search {} was terminated", collector.query_key());
                self.dispatcher.terminate(collector.task_ctx().id());
                collector.force_complete();
                break;
            }

            if collector.store().should_terminate() {
                tracing::info!(
                    "Search {} has collected enough events, terminating early",
                    collector.query_key()
                );
                self.dispatcher.terminate(collector.task_ctx().id());
                collector.force_complete();
                break;
            }

            if done || collector.is_complete() {
                tracing::info!("Search {} is complete", collector.query_key());
                self.dispatcher.terminate(collector.task_ctx().id());
                break;
            }

            collector.fail_stalled_nodes(self.config.node_liveness_timeout_ms);
        }
    }
}
