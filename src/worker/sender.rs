use super::types::{NodeResult, ResultCallback};
use crate::cluster::completion::CompletionState;
use crate::coprocessor::types::{CoprocessorKey, Payload};
use crate::coprocessor::Coprocessor;
use crate::node::types::NodeId;
use crate::task::context::TaskContext;
use crate::task::errors::ErrorQueue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The independent send-data loop of one node search.
///
/// Runs concurrently with the search work. Each tick snapshots a payload from
/// every coprocessor, drains queued errors, and delivers a [`NodeResult`] if
/// there is anything new to say (or the search has completed). Between ticks
/// it waits to the next send-frequency boundary, cut short the moment the
/// search-complete latch drops so the final result goes out promptly.
pub struct ResultSender {
    node: NodeId,
    source_node: NodeId,
    coprocessors: HashMap<CoprocessorKey, Arc<Coprocessor>>,
    callback: Arc<dyn ResultCallback>,
    frequency: Duration,
    ctx: TaskContext,
    errors: ErrorQueue,
    search_complete: Arc<CompletionState>,
    sequence: AtomicU64,
}

impl ResultSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: NodeId,
        source_node: NodeId,
        coprocessors: HashMap<CoprocessorKey, Arc<Coprocessor>>,
        callback: Arc<dyn ResultCallback>,
        frequency: Duration,
        ctx: TaskContext,
        errors: ErrorQueue,
        search_complete: Arc<CompletionState>,
    ) -> Self {
        Self {
            node,
            source_node,
            coprocessors,
            callback,
            frequency,
            ctx,
            errors,
            search_complete,
            sequence: AtomicU64::new(0),
        }
    }

    /// Sends until the search completes or the task is terminated. The final
    /// message carries `complete = true`.
    pub async fn run(self) {
        let mut next_send = Instant::now() + self.frequency;
        loop {
            // Wait to the next send boundary, or drop out as soon as the
            // search completes. A slow iteration shortens the following wait
            // instead of pushing every later send back.
            let wait = next_send.saturating_duration_since(Instant::now());
            let search_complete = self.search_complete.await_completion_timeout(wait).await;
            next_send = Instant::now().max(next_send) + self.frequency;

            if self.ctx.is_terminated() {
                tracing::debug!("Result sender stopping: task terminated");
                break;
            }

            let payloads = self.snapshot_payloads();
            let errors = self.errors.drain();

            // Only send when there is something new, or to flag completion.
            if !payloads.is_empty() || !errors.is_empty() || search_complete {
                let result = NodeResult {
                    payloads,
                    errors,
                    complete: search_complete,
                    sequence: self.sequence.fetch_add(1, Ordering::AcqRel),
                };

                tracing::debug!(
                    "Sending search result to {} (complete: {})",
                    self.source_node,
                    search_complete
                );
                if let Err(e) = self.callback.on_success(&self.node, result) {
                    tracing::info!("Terminating search because we were unable to send result: {e}");
                    self.ctx.terminate();
                    break;
                }
            }

            if search_complete {
                break;
            }
        }
    }

    fn snapshot_payloads(&self) -> HashMap<CoprocessorKey, Payload> {
        self.coprocessors
            .iter()
            .filter_map(|(key, coprocessor)| {
                coprocessor
                    .create_payload()
                    .map(|payload| (key.clone(), payload))
            })
            .collect()
    }
}
