use super::sender::ResultSender;
use super::types::{NodeSearchTask, ResultCallback};
use crate::cluster::completion::CompletionState;
use crate::coprocessor::types::CoprocessorKey;
use crate::coprocessor::Coprocessor;
use crate::extraction::pipeline::PipelineProvider;
use crate::extraction::producer::ExtractionProducer;
use crate::query::field_index::FieldIndexMap;
use crate::query::types::PipelineRef;
use crate::shard::cache::SearcherCache;
use crate::shard::producer::ShardSearchProducer;
use crate::shard::store::IndexStore;
use crate::task::context::TaskContext;
use crate::task::errors::ErrorQueue;
use crate::config::SearchConfig;
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Node-local services a search task executes against. Owned by the node and
/// shared across all concurrent search tasks running on it.
pub struct NodeSearchServices {
    pub index_store: Arc<IndexStore>,
    pub searcher_cache: Arc<SearcherCache>,
    pub pipelines: Arc<dyn PipelineProvider>,
    pub config: SearchConfig,
}

/// Runs one dispatched node search task to completion.
///
/// Setup failures (missing index, no stored fields) fail the task outright
/// via `on_failure`. Once the producers are running, faults degrade to error
/// strings carried in result messages; the search work and the result sender
/// run concurrently and both stop promptly on termination.
pub async fn execute(
    task: NodeSearchTask,
    ctx: TaskContext,
    services: Arc<NodeSearchServices>,
    callback: Arc<dyn ResultCallback>,
) {
    if ctx.is_terminated() {
        return;
    }

    tracing::info!(
        "Initialising search {} on node {} ({} shard(s))",
        task.query_key,
        task.target_node,
        task.shard_ids.len()
    );

    let setup = match prepare(&task, &services) {
        Ok(setup) => setup,
        Err(e) => {
            callback.on_failure(&task.target_node, &e.to_string());
            return;
        }
    };

    let errors = ErrorQueue::new();
    let search_complete = Arc::new(CompletionState::new());
    let hit_count = Arc::new(AtomicU64::new(0));

    // Start forwarding data to the requesting node.
    let sender = ResultSender::new(
        task.target_node.clone(),
        task.source_node.clone(),
        setup.coprocessors.clone(),
        callback,
        Duration::from_millis(task.result_send_frequency_ms.max(1)),
        ctx.clone(),
        errors.clone(),
        search_complete.clone(),
    );
    let sender_handle = tokio::spawn(sender.run());

    tracing::info!("Searching...");

    let (tx, rx) = mpsc::channel(services.config.max_stored_data_queue_size.max(1));

    let shard_producer = ShardSearchProducer::new(
        ctx.clone(),
        services.searcher_cache.clone(),
        task.shard_ids.clone(),
        Arc::new(task.query.clone()),
        services.config.max_boolean_clause_count,
        setup.field_slots,
        setup.row_width,
        errors.clone(),
        hit_count.clone(),
        services.config.max_shard_tasks,
    );

    let extraction_producer = ExtractionProducer::new(
        ctx.clone(),
        setup.buckets,
        services.pipelines.clone(),
        setup.stored,
        setup.extracted,
        errors.clone(),
        services.config.max_extraction_tasks,
    );

    let progress_handle = tokio::spawn(report_progress(
        shard_producer.clone(),
        extraction_producer.clone(),
        hit_count.clone(),
        search_complete.clone(),
    ));

    let producer_handle = tokio::spawn(shard_producer.run(tx));
    extraction_producer.run(rx).await;
    let _ = producer_handle.await;

    search_complete.signal();
    let _ = progress_handle.await;

    tracing::info!(
        "Search complete on node {} with {} hit(s), sending final results",
        task.target_node,
        hit_count.load(Ordering::Relaxed)
    );
    let _ = sender_handle.await;
}

struct SearchSetup {
    coprocessors: HashMap<CoprocessorKey, Arc<Coprocessor>>,
    buckets: HashMap<Option<PipelineRef>, Vec<Arc<Coprocessor>>>,
    stored: Arc<FieldIndexMap>,
    extracted: Arc<FieldIndexMap>,
    field_slots: Arc<Vec<(String, usize)>>,
    row_width: usize,
}

/// Validates preconditions and builds the coprocessors plus the shared field
/// maps. Field maps are mutable only here; afterwards they are frozen behind
/// `Arc` and read concurrently.
fn prepare(task: &NodeSearchTask, services: &NodeSearchServices) -> Result<SearchSetup> {
    services
        .index_store
        .index(&task.query.data_source.uuid)
        .ok_or_else(|| {
            anyhow!(
                "Search index '{}' could not be loaded",
                task.query.data_source.name
            )
        })?;

    if task.stored_fields.is_empty() {
        bail!("No stored fields have been requested");
    }
    if task.coprocessors.is_empty() {
        bail!("No result components have been requested");
    }

    let mut stored = FieldIndexMap::new();
    for field in &task.stored_fields {
        stored.create(field);
    }
    let mut extracted = FieldIndexMap::new();

    let mut coprocessors = HashMap::new();
    let mut buckets: HashMap<Option<PipelineRef>, Vec<Arc<Coprocessor>>> = HashMap::new();

    for (key, settings) in &task.coprocessors {
        // Components with an extraction pipeline address extracted rows;
        // everything else addresses the stored projection directly.
        let bucket = settings.extraction().cloned();
        let field_index = if bucket.is_some() {
            &mut extracted
        } else {
            &mut stored
        };

        let coprocessor = Arc::new(Coprocessor::create(settings, field_index));
        coprocessors.insert(key.clone(), coprocessor.clone());
        buckets.entry(bucket).or_default().push(coprocessor);
    }

    let field_slots: Arc<Vec<(String, usize)>> = Arc::new(
        stored
            .entries()
            .map(|(field, slot)| (field.to_string(), slot))
            .collect(),
    );
    let row_width = stored.len();

    Ok(SearchSetup {
        coprocessors,
        buckets,
        stored: Arc::new(stored),
        extracted: Arc::new(extracted),
        field_slots,
        row_width,
    })
}

/// Reports producer progress once a second until the search completes.
async fn report_progress(
    shard_producer: Arc<ShardSearchProducer>,
    extraction_producer: Arc<ExtractionProducer>,
    hit_count: Arc<AtomicU64>,
    search_complete: Arc<CompletionState>,
) {
    loop {
        if search_complete
            .await_completion_timeout(Duration::from_secs(1))
            .await
        {
            break;
        }
        tracing::debug!(
            "Shards remaining: {}, extraction tasks remaining: {}, hits: {}",
            shard_producer.remaining_shards(),
            extraction_producer.remaining_tasks(),
            hit_count.load(Ordering::Relaxed)
        );
    }
}
