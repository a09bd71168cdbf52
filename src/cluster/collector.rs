use super::completion::CompletionState;
use super::dispatch::SearchDispatcher;
use super::store::{SearchResultStore, StoreData};
use crate::coprocessor::types::CoprocessorKey;
use crate::node::types::NodeId;
use crate::query::types::QueryKey;
use crate::task::context::TaskContext;
use crate::task::types::now_ms;
use crate::worker::types::{NodeResult, ResultCallback};
use anyhow::{anyhow, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Aggregates NodeResult messages from all participating nodes into the
/// shared result store and tracks overall completion.
///
/// All node-keyed maps are concurrent structures: result callbacks for
/// different nodes arrive in parallel and must not serialise on one lock.
/// Error sets are created lazily and atomically per node on first use.
pub struct ClusterResultCollector {
    query_key: QueryKey,
    ctx: TaskContext,
    store: Arc<SearchResultStore>,
    dispatcher: Arc<dyn SearchDispatcher>,
    cache: Arc<CollectorCache>,
    remaining: DashMap<NodeId, ()>,
    remaining_count: AtomicUsize,
    errors: DashMap<NodeId, Vec<String>>,
    last_seen: DashMap<NodeId, u64>,
    last_sequence: DashMap<NodeId, u64>,
    completion: CompletionState,
    created_ms: u64,
}

impl ClusterResultCollector {
    /// Creates the collector and registers it with the cache so the client
    /// polling path can find it by query key.
    pub fn new(
        query_key: QueryKey,
        store: Arc<SearchResultStore>,
        dispatcher: Arc<dyn SearchDispatcher>,
        cache: Arc<CollectorCache>,
    ) -> Arc<Self> {
        let collector = Arc::new(Self {
            query_key,
            ctx: TaskContext::root(),
            store,
            dispatcher,
            cache: cache.clone(),
            remaining: DashMap::new(),
            remaining_count: AtomicUsize::new(0),
            errors: DashMap::new(),
            last_seen: DashMap::new(),
            last_sequence: DashMap::new(),
            completion: CompletionState::new(),
            created_ms: now_ms(),
        });
        cache.insert(collector.clone());
        collector
    }

    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    /// The cluster search task context; node tasks descend from its id.
    pub fn task_ctx(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<SearchResultStore> {
        &self.store
    }

    /// Registers a node we expect a complete result from. Called by the
    /// coordinator once per dispatched node, before any result can arrive.
    pub fn expect_node(&self, node: NodeId) {
        if self.remaining.insert(node, ()).is_none() {
            self.remaining_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn record_node_error(&self, node: &NodeId, message: impl Into<String>) {
        self.errors.entry(node.clone()).or_default().push(message.into());
    }

    /// Current (possibly partial) merged result for one component; always
    /// available mid-search for incremental display.
    pub fn get_data(&self, component: &CoprocessorKey) -> Option<StoreData> {
        self.store.data(component)
    }

    /// Flat error list with a node-name header per non-empty set, or `None`
    /// when no errors exist, never an empty list.
    pub fn get_errors(&self) -> Option<Vec<String>> {
        let mut nodes: Vec<NodeId> = self
            .errors
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        if nodes.is_empty() {
            return None;
        }
        nodes.sort();

        let mut out = Vec::new();
        for node in nodes {
            if let Some(entry) = self.errors.get(&node) {
                out.push(format!("Node: {}", node));
                out.extend(entry.value().iter().cloned());
            }
        }
        Some(out)
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub async fn await_completion(&self) {
        self.completion.await_completion().await;
    }

    pub async fn await_completion_timeout(&self, timeout: Duration) -> bool {
        self.completion.await_completion_timeout(timeout).await
    }

    /// Marks the whole search complete regardless of outstanding nodes.
    pub fn force_complete(&self) {
        self.completion.signal();
    }

    /// Fails every expected node whose last report is older than the liveness
    /// timeout, so a silently dead node cannot stall the search forever.
    pub fn fail_stalled_nodes(&self, timeout_ms: u64) {
        let now = now_ms();
        let stalled: Vec<NodeId> = self
            .remaining
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|node| {
                let last = self
                    .last_seen
                    .get(node)
                    .map(|entry| *entry.value())
                    .unwrap_or(self.created_ms);
                now.saturating_sub(last) > timeout_ms
            })
            .collect();

        for node in stalled {
            tracing::warn!("Node {} stopped responding, failing it", node);
            self.on_failure(&node, "Node stopped responding while the search was incomplete");
        }
    }

    /// Destroys the collector: deregisters it from the cache, forces
    /// completion, and terminates any still-running node tasks so a partially
    /// consumed search does not leak running work.
    pub fn destroy(&self) {
        self.cache.remove(&self.query_key);
        self.completion.signal();
        self.ctx.terminate();
        self.dispatcher.terminate(self.ctx.id());
    }

    fn node_complete(&self, node: &NodeId) {
        if self.remaining.remove(node).is_some()
            && self.remaining_count.fetch_sub(1, Ordering::AcqRel) == 1
        {
            self.completion.signal();
        }
    }

    /// True when `sequence` advances this node's stream; duplicates and
    /// reordered redelivery are dropped so deltas cannot double-apply.
    fn advance_sequence(&self, node: &NodeId, sequence: u64) -> bool {
        let mut entry = self.last_sequence.entry(node.clone()).or_insert(0);
        let expected_next = *entry.value();
        if sequence < expected_next {
            return false;
        }
        *entry.value_mut() = sequence + 1;
        true
    }
}

impl ResultCallback for ClusterResultCollector {
    fn on_success(&self, node: &NodeId, result: NodeResult) -> Result<()> {
        // A terminated/complete search rejects late deliveries; the sending
        // node reacts by terminating its local task.
        if self.completion.is_complete() {
            return Err(anyhow!("Search {} has already completed", self.query_key));
        }

        if !self.advance_sequence(node, result.sequence) {
            tracing::warn!(
                "Dropping redelivered result {} from node {}",
                result.sequence,
                node
            );
            return Ok(());
        }

        for (key, payload) in &result.payloads {
            self.store.apply(key, payload);
        }
        for error in result.errors {
            self.record_node_error(node, error);
        }

        if result.complete {
            self.node_complete(node);
        } else {
            self.last_seen.insert(node.clone(), now_ms());
        }
        Ok(())
    }

    fn on_failure(&self, node: &NodeId, message: &str) {
        self.record_node_error(node, message);
        self.node_complete(node);
    }
}

/// Bounded, injected cache of live collectors keyed by query key.
///
/// The client polling path looks collectors up here between requests. When
/// over capacity the oldest collector is destroyed and evicted.
pub struct CollectorCache {
    collectors: DashMap<QueryKey, Arc<ClusterResultCollector>>,
    capacity: usize,
}

impl CollectorCache {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            collectors: DashMap::new(),
            capacity: capacity.max(1),
        })
    }

    pub fn insert(&self, collector: Arc<ClusterResultCollector>) {
        while self.collectors.len() >= self.capacity {
            let oldest = self
                .collectors
                .iter()
                .min_by_key(|entry| entry.value().created_ms)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    if let Some((_, evicted)) = self.collectors.remove(&key) {
                        tracing::info!("Evicting result collector for search {}", key);
                        evicted.destroy();
                    }
                }
                None => break,
            }
        }
        self.collectors
            .insert(collector.query_key().clone(), collector);
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<ClusterResultCollector>> {
        self.collectors.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &QueryKey) {
        self.collectors.remove(key);
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
