use super::types::{Node, NodeId};
use dashmap::DashMap;
use std::collections::HashSet;

/// Registry of cluster members and their search eligibility.
///
/// Backed by a `DashMap` so membership updates and target resolution can run
/// concurrently with in-flight searches.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: DashMap<NodeId, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &NodeId) -> Option<Node> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    /// The set of nodes eligible to receive search tasks right now.
    pub fn target_nodes(&self) -> HashSet<NodeId> {
        self.nodes
            .iter()
            .filter(|entry| entry.value().enabled && entry.value().active)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
