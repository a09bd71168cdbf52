//! Search Engine Configuration
//!
//! Central knobs for the cluster search core. Every bound that governs a
//! queue, cache, or worker pool lives here so that deployments can tune the
//! engine without touching code. Values deserialize from JSON/YAML via serde
//! and fall back to the documented defaults.

use serde::{Deserialize, Serialize};

/// Behaviour/configuration knobs for one search engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of leaf clauses a compiled query expression may contain.
    pub max_boolean_clause_count: usize,
    /// Capacity of the bounded stored-data transfer queue between the shard
    /// producer and the extraction/transfer loop. When full the shard
    /// producer blocks rather than dropping rows.
    pub max_stored_data_queue_size: usize,
    /// Maximum number of shard searchers held open by the shared cache.
    pub max_open_shards: usize,
    /// Maximum concurrent shard search tasks per node search.
    pub max_shard_tasks: usize,
    /// Maximum concurrent extraction tasks per node search.
    pub max_extraction_tasks: usize,
    /// Default cap on accumulated results per component when the component
    /// settings do not specify one.
    pub default_max_results: usize,
    /// How often a node packages coprocessor payloads into a result message.
    pub result_send_frequency_ms: u64,
    /// Tick interval of the coordinator's completion poll loop.
    pub poll_interval_ms: u64,
    /// A node that has not reported for this long while still incomplete is
    /// failed so it cannot stall the overall search.
    pub node_liveness_timeout_ms: u64,
    /// Maximum number of live result collectors retained by the cache.
    pub collector_cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_boolean_clause_count: 1024,
            max_stored_data_queue_size: 1000,
            max_open_shards: 64,
            max_shard_tasks: 4,
            max_extraction_tasks: 4,
            default_max_results: 1_000_000,
            result_send_frequency_ms: 1000,
            poll_interval_ms: 1000,
            node_liveness_timeout_ms: 60_000,
            collector_cache_capacity: 100,
        }
    }
}
