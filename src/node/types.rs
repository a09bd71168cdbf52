use serde::{Deserialize, Serialize};

/// Identifies one node in the cluster by its configured name.
///
/// Node names are stable across restarts and are what appears in the
/// node-scoped error headers returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member of the cluster as seen by the search coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Administratively enabled for search work.
    pub enabled: bool,
    /// Currently reachable according to the platform's liveness mechanism.
    pub active: bool,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            enabled: true,
            active: true,
        }
    }
}
