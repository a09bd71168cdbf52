//! Search Dispatch Protocol
//!
//! Message shapes exchanged between the coordinating node and worker nodes.
//! The transport carrying them is an external collaborator; these types only
//! define what crosses it.

use crate::coprocessor::types::{CoprocessorKey, CoprocessorSettings, Payload};
use crate::node::types::NodeId;
use crate::query::types::{Query, QueryKey};
use crate::shard::types::ShardId;
use crate::task::types::TaskId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-node search task dispatched by the cluster coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSearchTask {
    pub query_key: QueryKey,
    /// Id of the originating cluster search task; node-local work registers
    /// under this ancestor so a single broadcast can terminate it.
    pub ancestor_task_id: TaskId,
    pub source_node: NodeId,
    pub target_node: NodeId,
    pub query: Query,
    /// Shards assigned to the target node, ordered newest first.
    pub shard_ids: Vec<ShardId>,
    /// Stored-field projection raw rows are built from.
    pub stored_fields: Vec<String>,
    /// How often the node packages payloads into a result message.
    pub result_send_frequency_ms: u64,
    pub coprocessors: HashMap<CoprocessorKey, CoprocessorSettings>,
    pub date_time_locale: String,
    /// Search-start timestamp used to resolve relative date terms.
    pub now_epoch_ms: u64,
}

/// Unit of transfer from a worker node back to the collector.
///
/// Payloads are monotonic deltas (data shipped once is never resent), so the
/// collector applies them additively. `sequence` increases by one per message
/// from a given node, letting the collector discard transport redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub payloads: HashMap<CoprocessorKey, Payload>,
    pub errors: Vec<String>,
    pub complete: bool,
    pub sequence: u64,
}

/// Async delivery contract back to the requesting node, supplied by the
/// transport the core does not own.
///
/// `on_success` returns an error when the receiving side rejects the result
/// (e.g. the search was already terminated there); the sender reacts by
/// terminating its local task instead of retrying.
pub trait ResultCallback: Send + Sync {
    fn on_success(&self, node: &NodeId, result: NodeResult) -> Result<()>;
    fn on_failure(&self, node: &NodeId, message: &str);
}
