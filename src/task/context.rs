use super::types::TaskId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token for one task in the search task tree.
///
/// Cloning is cheap and shares the underlying flag. Loops that search shards,
/// drain queues, or send results must call [`TaskContext::is_terminated`] at
/// every iteration, not only at entry.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<Inner>,
}

struct Inner {
    id: TaskId,
    ancestor: TaskId,
    terminated: AtomicBool,
}

impl TaskContext {
    /// Root context for a new cluster search. The task is its own ancestor.
    pub fn root() -> Self {
        let id = TaskId::new();
        Self::with_ids(id.clone(), id)
    }

    /// Context for a node-local task descending from a cluster search task.
    pub fn child_of(ancestor: TaskId) -> Self {
        Self::with_ids(TaskId::new(), ancestor)
    }

    fn with_ids(id: TaskId, ancestor: TaskId) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                ancestor,
                terminated: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.inner.id
    }

    pub fn ancestor(&self) -> &TaskId {
        &self.inner.ancestor
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    pub fn terminate(&self) {
        if !self.inner.terminated.swap(true, Ordering::AcqRel) {
            tracing::debug!("Task {} terminated", self.inner.id);
        }
    }
}

/// Node-local registry of live task contexts.
///
/// Supports the cluster-wide termination broadcast: terminating by ancestor id
/// flips the flag on every registered context that belongs to that search
/// task tree, including the ancestor itself if it runs on this node.
#[derive(Default)]
pub struct TaskManager {
    tasks: DashMap<TaskId, TaskContext>,
}

impl TaskManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, ctx: TaskContext) {
        self.tasks.insert(ctx.id().clone(), ctx);
    }

    pub fn deregister(&self, id: &TaskId) {
        self.tasks.remove(id);
    }

    /// Terminates every registered task descending from the given ancestor.
    pub fn terminate_ancestor(&self, ancestor: &TaskId) {
        let mut count = 0usize;
        for entry in self.tasks.iter() {
            let ctx = entry.value();
            if ctx.ancestor() == ancestor || ctx.id() == ancestor {
                ctx.terminate();
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!("Terminated {} task(s) for ancestor {}", count, ancestor);
        }
    }

    pub fn live_count(&self) -> usize {
        self.tasks.len()
    }
}
