use super::pipeline::{ExtractionContext, PipelineProvider};
use crate::coprocessor::Coprocessor;
use crate::query::field_index::{FieldIndexMap, RawRow};
use crate::query::types::PipelineRef;
use crate::task::context::TaskContext;
use crate::task::errors::ErrorQueue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Poll timeout on the transfer queue so the loop can re-check cancellation
/// while the shard producer is still working.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Rows buffered per stream before an extraction task is dispatched.
const STREAM_BATCH_SIZE: usize = 64;

/// Consumes the transfer queue and routes rows to coprocessors.
///
/// Rows for extractionless components go straight to their coprocessors.
/// Rows for components with an extraction pipeline are grouped by source
/// stream to amortise pipeline setup, then dispatched to a bounded pool of
/// extraction tasks. The loop is complete when the shard producer has
/// finished and the queue is drained, which the closed channel signals
/// without any end-of-stream sentinel.
pub struct ExtractionProducer {
    ctx: TaskContext,
    /// Coprocessors keyed by the pipeline that feeds them; `None` is the
    /// direct-transfer bucket.
    buckets: HashMap<Option<PipelineRef>, Vec<Arc<Coprocessor>>>,
    provider: Arc<dyn PipelineProvider>,
    extraction_context: Arc<ExtractionContext>,
    /// Slot of the stream id field in incoming raw rows.
    stream_slot: Option<usize>,
    errors: ErrorQueue,
    remaining: Arc<AtomicUsize>,
    max_tasks: usize,
}

impl ExtractionProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: TaskContext,
        buckets: HashMap<Option<PipelineRef>, Vec<Arc<Coprocessor>>>,
        provider: Arc<dyn PipelineProvider>,
        stored: Arc<FieldIndexMap>,
        extracted: Arc<FieldIndexMap>,
        errors: ErrorQueue,
        max_tasks: usize,
    ) -> Arc<Self> {
        let stream_slot = stored.get(crate::coprocessor::types::STREAM_ID_FIELD);
        Arc::new(Self {
            ctx,
            buckets,
            provider,
            extraction_context: Arc::new(ExtractionContext { stored, extracted }),
            stream_slot,
            errors,
            remaining: Arc::new(AtomicUsize::new(0)),
            max_tasks,
        })
    }

    /// Number of dispatched extraction tasks not yet finished, for progress
    /// reporting.
    pub fn remaining_tasks(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Drains the transfer queue until the producer side closes it, then
    /// waits for all outstanding extraction tasks.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RawRow>) {
        let semaphore = Arc::new(Semaphore::new(self.max_tasks.max(1)));
        let mut tasks = JoinSet::new();
        let mut buffers: HashMap<u64, Vec<RawRow>> = HashMap::new();
        let needs_extraction = self.buckets.keys().any(|bucket| bucket.is_some());

        loop {
            if self.ctx.is_terminated() {
                break;
            }

            match tokio::time::timeout(POLL_TIMEOUT, rx.recv()).await {
                Ok(Some(row)) => {
                    self.direct_transfer(&row);

                    if needs_extraction {
                        let stream_id = self.stream_id(&row);
                        let buffer = buffers.entry(stream_id).or_default();
                        buffer.push(row);
                        if buffer.len() >= STREAM_BATCH_SIZE {
                            let rows = std::mem::take(buffer);
                            self.dispatch(stream_id, rows, &semaphore, &mut tasks).await;
                        }
                    }
                }
                Ok(None) => {
                    // Shard producer finished and the queue is now empty.
                    break;
                }
                Err(_) => {
                    // Idle tick: flush partial stream batches so slow searches
                    // still deliver incremental results.
                    self.flush_all(&mut buffers, &semaphore, &mut tasks).await;
                }
            }
        }

        if !self.ctx.is_terminated() {
            self.flush_all(&mut buffers, &semaphore, &mut tasks).await;
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Raw rows go straight to every coprocessor in the extractionless bucket.
    fn direct_transfer(&self, row: &RawRow) {
        if let Some(coprocessors) = self.buckets.get(&None) {
            for coprocessor in coprocessors {
                coprocessor.receive(row);
            }
        }
    }

    fn stream_id(&self, row: &RawRow) -> u64 {
        self.stream_slot
            .and_then(|slot| row.get(slot))
            .and_then(|value| value.as_deref())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0)
    }

    async fn flush_all(
        &self,
        buffers: &mut HashMap<u64, Vec<RawRow>>,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<()>,
    ) {
        let drained: Vec<(u64, Vec<RawRow>)> = buffers
            .drain()
            .filter(|(_, rows)| !rows.is_empty())
            .collect();
        for (stream_id, rows) in drained {
            self.dispatch(stream_id, rows, semaphore, tasks).await;
        }
    }

    /// Runs one stream's rows through every extraction bucket on the worker
    /// pool. Per-stream failures become error strings, never task failures.
    async fn dispatch(
        &self,
        stream_id: u64,
        rows: Vec<RawRow>,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<()>,
    ) {
        let extraction_buckets: Vec<(PipelineRef, Vec<Arc<Coprocessor>>)> = self
            .buckets
            .iter()
            .filter_map(|(bucket, coprocessors)| {
                bucket
                    .as_ref()
                    .map(|reference| (reference.clone(), coprocessors.clone()))
            })
            .collect();
        if extraction_buckets.is_empty() {
            return;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        self.remaining.fetch_add(1, Ordering::AcqRel);
        let ctx = self.ctx.clone();
        let provider = self.provider.clone();
        let extraction_context = self.extraction_context.clone();
        let errors = self.errors.clone();
        let remaining = self.remaining.clone();

        tasks.spawn(async move {
            for (reference, coprocessors) in extraction_buckets {
                if ctx.is_terminated() {
                    break;
                }

                match provider
                    .pipeline(&reference)
                    .and_then(|pipeline| pipeline.extract(stream_id, &rows, &extraction_context))
                {
                    Ok(extracted) => {
                        for row in &extracted {
                            for coprocessor in &coprocessors {
                                coprocessor.receive(row);
                            }
                        }
                    }
                    Err(e) => {
                        errors.push(format!(
                            "Extraction failed for stream {} via pipeline '{}': {}",
                            stream_id, reference.name, e
                        ));
                    }
                }
            }
            remaining.fetch_sub(1, Ordering::AcqRel);
            drop(permit);
        });
    }
}
