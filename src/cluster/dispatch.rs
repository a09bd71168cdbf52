use crate::node::types::NodeId;
use crate::task::context::{TaskContext, TaskManager};
use crate::task::types::TaskId;
use crate::worker::handler::{self, NodeSearchServices};
use crate::worker::types::{NodeSearchTask, ResultCallback};
use dashmap::DashMap;
use std::sync::Arc;

/// Outbound transport seam the cluster coordinator sends through.
///
/// The real RPC mechanism is an external collaborator. Termination has its
/// own operation on a channel independent of the originating task's
/// lifecycle, so a terminated search can still broadcast its own cleanup.
pub trait SearchDispatcher: Send + Sync {
    /// Sends a node search task to `node`. Results come back through
    /// `callback`. Best-effort: an unreachable node is reported via
    /// `on_failure`, not returned as an error.
    fn dispatch(&self, node: &NodeId, task: NodeSearchTask, callback: Arc<dyn ResultCallback>);

    /// Broadcasts terminate-by-ancestor to every node. Fire-and-forget.
    fn terminate(&self, ancestor: &TaskId);
}

struct LocalNode {
    services: Arc<NodeSearchServices>,
    tasks: Arc<TaskManager>,
}

/// In-process dispatcher executing node search tasks on the local runtime.
///
/// Each registered "node" gets its own task manager and services, so a single
/// process can host a whole cluster, which is how the integration tests and
/// the demo binary run multi-node searches.
#[derive(Default)]
pub struct LocalDispatcher {
    nodes: DashMap<NodeId, LocalNode>,
}

impl LocalDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_node(&self, id: NodeId, services: Arc<NodeSearchServices>) {
        self.nodes.insert(
            id,
            LocalNode {
                services,
                tasks: TaskManager::new(),
            },
        );
    }

    /// Live task count across all registered nodes, for tests/diagnostics.
    pub fn live_tasks(&self) -> usize {
        self.nodes
            .iter()
            .map(|entry| entry.value().tasks.live_count())
            .sum()
    }
}

impl SearchDispatcher for LocalDispatcher {
    fn dispatch(&self, node: &NodeId, task: NodeSearchTask, callback: Arc<dyn ResultCallback>) {
        let Some(entry) = self.nodes.get(node) else {
            callback.on_failure(node, "Node is not available");
            return;
        };

        let services = entry.services.clone();
        let tasks = entry.tasks.clone();
        drop(entry);

        let ctx = TaskContext::child_of(task.ancestor_task_id.clone());
        tasks.register(ctx.clone());

        tokio::spawn(async move {
            let id = ctx.id().clone();
            handler::execute(task, ctx, services, callback).await;
            tasks.deregister(&id);
        });
    }

    fn terminate(&self, ancestor: &TaskId) {
        for entry in self.nodes.iter() {
            entry.value().tasks.terminate_ancestor(ancestor);
        }
    }
}
