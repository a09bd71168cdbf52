//! Worker Module Tests
//!
//! Validates the target-node side of a search: the result sender loop and the
//! end-to-end node search handler.
//!
//! ## Test Scopes
//! - **Sender**: Tick gating, the final complete message, rejected delivery.
//! - **Handler**: Full node searches, setup failures, result message shapes.
//! - **Serialization**: Checks the dispatch types survive the wire format.

#[cfg(test)]
mod tests {
    use crate::cluster::completion::CompletionState;
    use crate::config::SearchConfig;
    use crate::coprocessor::types::{
        Aggregate, CoprocessorKey, CoprocessorSettings, EventRefSettings, Payload, TableSettings,
        EVENT_ID_FIELD, STREAM_ID_FIELD,
    };
    use crate::coprocessor::Coprocessor;
    use crate::extraction::pipeline::StaticPipelineProvider;
    use crate::node::types::NodeId;
    use crate::query::field_index::FieldIndexMap;
    use crate::query::types::{Condition, DataSourceRef, ExpressionNode, Query, QueryKey};
    use crate::shard::cache::SearcherCache;
    use crate::shard::store::IndexStore;
    use crate::shard::types::{
        Document, Index, IndexShard, ShardFormatVersion, ShardId, ShardStatus,
    };
    use crate::task::context::TaskContext;
    use crate::task::errors::ErrorQueue;
    use crate::task::types::{now_ms, TaskId};
    use crate::worker::handler::{self, NodeSearchServices};
    use crate::worker::sender::ResultSender;
    use crate::worker::types::{NodeResult, NodeSearchTask, ResultCallback};
    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    /// Callback capturing everything delivered, optionally rejecting sends.
    #[derive(Default)]
    struct RecordingCallback {
        results: Mutex<Vec<NodeResult>>,
        failures: Mutex<Vec<String>>,
        reject: bool,
    }

    impl RecordingCallback {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                reject: true,
                ..Self::default()
            })
        }

        fn results(&self) -> Vec<NodeResult> {
            self.results.lock().clone()
        }

        fn failures(&self) -> Vec<String> {
            self.failures.lock().clone()
        }
    }

    impl ResultCallback for RecordingCallback {
        fn on_success(&self, _node: &NodeId, result: NodeResult) -> Result<()> {
            if self.reject {
                return Err(anyhow!("Search has already completed"));
            }
            self.results.lock().push(result);
            Ok(())
        }

        fn on_failure(&self, _node: &NodeId, message: &str) {
            self.failures.lock().push(message.to_string());
        }
    }

    fn count_by_user() -> CoprocessorSettings {
        CoprocessorSettings::Table(TableSettings {
            group_fields: vec!["User".to_string()],
            aggregates: vec![Aggregate::Count],
            max_results: None,
            extraction: None,
        })
    }

    fn sender_with(
        coprocessor: Arc<Coprocessor>,
        callback: Arc<RecordingCallback>,
        ctx: TaskContext,
        errors: ErrorQueue,
        search_complete: Arc<CompletionState>,
    ) -> ResultSender {
        let mut coprocessors = HashMap::new();
        coprocessors.insert(CoprocessorKey::new("table-1"), coprocessor);
        ResultSender::new(
            NodeId::new("worker"),
            NodeId::new("source"),
            coprocessors,
            callback,
            Duration::from_millis(20),
            ctx,
            errors,
            search_complete,
        )
    }

    // ============================================================
    // RESULT SENDER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_sender_final_message_flags_complete() {
        // ARRANGE: search completes before the first tick, no data at all
        let mut field_index = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(), &mut field_index));
        let callback = RecordingCallback::new();
        let search_complete = Arc::new(CompletionState::new());
        search_complete.signal();

        let sender = sender_with(
            coprocessor,
            callback.clone(),
            TaskContext::root(),
            ErrorQueue::new(),
            search_complete,
        );

        // ACT
        sender.run().await;

        // ASSERT: exactly one message, complete and empty
        let results = callback.results();
        assert_eq!(results.len(), 1);
        assert!(results[0].complete);
        assert!(results[0].payloads.is_empty());
        assert_eq!(results[0].sequence, 0);
    }

    #[tokio::test]
    async fn test_sender_sends_only_when_there_is_something_to_say() {
        // ARRANGE
        let mut field_index = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(), &mut field_index));
        let callback = RecordingCallback::new();
        let search_complete = Arc::new(CompletionState::new());

        let sender = sender_with(
            coprocessor.clone(),
            callback.clone(),
            TaskContext::root(),
            ErrorQueue::new(),
            search_complete.clone(),
        );
        let handle = tokio::spawn(sender.run());

        // ACT: several empty ticks pass first
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(callback.results().is_empty());

        // Then data arrives and the next tick ships it.
        coprocessor.receive(&vec![Some("alice".to_string())]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mid_flight = callback.results();
        assert_eq!(mid_flight.len(), 1);
        assert!(!mid_flight[0].complete);
        assert_eq!(mid_flight[0].payloads.len(), 1);

        // Completion cuts the frequency wait short and sends the final flag.
        search_complete.signal();
        handle.await.unwrap();

        let results = callback.results();
        assert!(results.last().unwrap().complete);
        // Sequence numbers advance by one per message.
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.sequence, i as u64);
        }
    }

    #[tokio::test]
    async fn test_sender_ships_queued_errors() {
        let mut field_index = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(), &mut field_index));
        let callback = RecordingCallback::new();
        let errors = ErrorQueue::new();
        errors.push("Shard 3: corrupt");
        let search_complete = Arc::new(CompletionState::new());
        search_complete.signal();

        let sender = sender_with(
            coprocessor,
            callback.clone(),
            TaskContext::root(),
            errors.clone(),
            search_complete,
        );
        sender.run().await;

        let results = callback.results();
        assert_eq!(results[0].errors, vec!["Shard 3: corrupt".to_string()]);
        // Drained on send: delivered exactly once.
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_sender_terminates_task_when_delivery_is_rejected() {
        // ARRANGE: the receiving side rejects (search already gone there)
        let mut field_index = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(), &mut field_index));
        coprocessor.receive(&vec![Some("alice".to_string())]);
        let callback = RecordingCallback::rejecting();
        let ctx = TaskContext::root();

        let sender = sender_with(
            coprocessor,
            callback,
            ctx.clone(),
            ErrorQueue::new(),
            Arc::new(CompletionState::new()),
        );

        // ACT
        sender.run().await;

        // ASSERT: the local task stops instead of retrying forever
        assert!(ctx.is_terminated());
    }

    /// Callback whose delivery overruns the send frequency and leaves fresh
    /// data behind, so every following tick has something to ship. Terminates
    /// the task after the third delivery.
    struct SlowFeedingCallback {
        coprocessor: Arc<Coprocessor>,
        ctx: TaskContext,
        sent_at: Mutex<Vec<std::time::Instant>>,
    }

    impl ResultCallback for SlowFeedingCallback {
        fn on_success(&self, _node: &NodeId, _result: NodeResult) -> Result<()> {
            let mut sent_at = self.sent_at.lock();
            sent_at.push(std::time::Instant::now());
            if sent_at.len() >= 3 {
                self.ctx.terminate();
                return Ok(());
            }
            drop(sent_at);
            std::thread::sleep(Duration::from_millis(100));
            self.coprocessor.receive(&vec![Some("alice".to_string())]);
            Ok(())
        }

        fn on_failure(&self, _node: &NodeId, _message: &str) {}
    }

    #[tokio::test]
    async fn test_sender_shortens_wait_after_slow_delivery() {
        // ARRANGE: data ready before the first tick; each delivery takes far
        // longer than the 30ms send frequency
        let mut field_index = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(), &mut field_index));
        coprocessor.receive(&vec![Some("alice".to_string())]);
        let ctx = TaskContext::root();
        let callback = Arc::new(SlowFeedingCallback {
            coprocessor: coprocessor.clone(),
            ctx: ctx.clone(),
            sent_at: Mutex::new(Vec::new()),
        });

        let mut coprocessors = HashMap::new();
        coprocessors.insert(CoprocessorKey::new("table-1"), coprocessor);
        let sender = ResultSender::new(
            NodeId::new("worker"),
            NodeId::new("source"),
            coprocessors,
            callback.clone(),
            Duration::from_millis(30),
            ctx,
            ErrorQueue::new(),
            Arc::new(CompletionState::new()),
        );

        // ACT
        sender.run().await;

        // ASSERT: an overrunning iteration sends again at once instead of
        // waiting out another full frequency, so the sends do not drift
        let sent_at = callback.sent_at.lock().clone();
        assert_eq!(sent_at.len(), 3);
        let elapsed = sent_at[2].duration_since(sent_at[0]);
        assert!(
            elapsed < Duration::from_millis(240),
            "sends drifted: {:?} between first and third delivery",
            elapsed
        );
    }

    // ============================================================
    // NODE SEARCH HANDLER TESTS
    // ============================================================

    fn services_with_shard(index_uuid: Uuid, documents: Vec<Document>) -> Arc<NodeSearchServices> {
        let index_store = IndexStore::new();
        index_store.add_index(Index {
            uuid: index_uuid,
            name: "events".to_string(),
            stored_fields: vec![
                STREAM_ID_FIELD.to_string(),
                EVENT_ID_FIELD.to_string(),
                "User".to_string(),
            ],
        });
        index_store.add_shard(
            IndexShard {
                id: ShardId(1),
                index_uuid,
                node: NodeId::new("worker"),
                partition: "2026-08".to_string(),
                status: ShardStatus::Active,
                format_version: ShardFormatVersion(1),
            },
            documents,
        );

        let config = SearchConfig::default();
        Arc::new(NodeSearchServices {
            searcher_cache: SearcherCache::new(index_store.clone(), config.max_open_shards),
            index_store,
            pipelines: StaticPipelineProvider::new(),
            config,
        })
    }

    fn node_task(
        index_uuid: Uuid,
        coprocessors: HashMap<CoprocessorKey, CoprocessorSettings>,
    ) -> NodeSearchTask {
        NodeSearchTask {
            query_key: QueryKey::new(),
            ancestor_task_id: TaskId::new(),
            source_node: NodeId::new("source"),
            target_node: NodeId::new("worker"),
            query: Query::new(
                DataSourceRef {
                    uuid: index_uuid,
                    name: "events".to_string(),
                },
                ExpressionNode::term("User", Condition::Equals, "user0"),
            ),
            shard_ids: vec![ShardId(1)],
            stored_fields: vec![
                STREAM_ID_FIELD.to_string(),
                EVENT_ID_FIELD.to_string(),
                "User".to_string(),
            ],
            result_send_frequency_ms: 20,
            coprocessors,
            date_time_locale: "UTC".to_string(),
            now_epoch_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn test_execute_runs_search_and_sends_complete_result() {
        // ARRANGE: 10 documents, 5 of them matching User == user0
        let index_uuid = Uuid::new_v4();
        let documents = (0..10)
            .map(|i| {
                Document::new([
                    (STREAM_ID_FIELD, "1".to_string()),
                    (EVENT_ID_FIELD, (i + 1).to_string()),
                    ("User", format!("user{}", i % 2)),
                ])
            })
            .collect();
        let services = services_with_shard(index_uuid, documents);

        let table_key = CoprocessorKey::new("table-1");
        let event_key = CoprocessorKey::new("events-1");
        let mut coprocessors = HashMap::new();
        coprocessors.insert(table_key.clone(), count_by_user());
        coprocessors.insert(
            event_key.clone(),
            CoprocessorSettings::EventRef(EventRefSettings {
                min_event: 1,
                max_event: u64::MAX,
                max_streams: 100,
                max_events: 1000,
                max_events_per_stream: 100,
            }),
        );
        let callback = RecordingCallback::new();

        // ACT
        handler::execute(
            node_task(index_uuid, coprocessors),
            TaskContext::root(),
            services,
            callback.clone(),
        )
        .await;

        // ASSERT: the last message is complete, and across all messages both
        // components received every match exactly once
        let results = callback.results();
        assert!(!results.is_empty());
        assert!(results.last().unwrap().complete);
        assert!(callback.failures().is_empty());

        let mut total_count = 0u64;
        let mut total_refs = 0usize;
        for result in &results {
            if let Some(Payload::Table(deltas)) = result.payloads.get(&table_key) {
                for delta in deltas {
                    if let crate::coprocessor::types::AggValue::Count(n) = &delta.values[0] {
                        total_count += n;
                    }
                }
            }
            if let Some(Payload::EventRefs(refs)) = result.payloads.get(&event_key) {
                total_refs += refs.len();
            }
        }
        assert_eq!(total_count, 5);
        assert_eq!(total_refs, 5);
    }

    #[tokio::test]
    async fn test_execute_fails_fast_for_missing_index() {
        let services = services_with_shard(Uuid::new_v4(), vec![]);
        let mut coprocessors = HashMap::new();
        coprocessors.insert(CoprocessorKey::new("table-1"), count_by_user());
        let callback = RecordingCallback::new();

        // Task addresses an index the store has never seen.
        handler::execute(
            node_task(Uuid::new_v4(), coprocessors),
            TaskContext::root(),
            services,
            callback.clone(),
        )
        .await;

        let failures = callback.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("could not be loaded"));
        assert!(callback.results().is_empty());
    }

    #[tokio::test]
    async fn test_execute_fails_fast_without_components() {
        let index_uuid = Uuid::new_v4();
        let services = services_with_shard(index_uuid, vec![]);
        let callback = RecordingCallback::new();

        handler::execute(
            node_task(index_uuid, HashMap::new()),
            TaskContext::root(),
            services,
            callback.clone(),
        )
        .await;

        let failures = callback.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("No result components"));
    }

    #[tokio::test]
    async fn test_execute_does_nothing_when_already_terminated() {
        let index_uuid = Uuid::new_v4();
        let services = services_with_shard(index_uuid, vec![]);
        let mut coprocessors = HashMap::new();
        coprocessors.insert(CoprocessorKey::new("table-1"), count_by_user());
        let callback = RecordingCallback::new();
        let ctx = TaskContext::root();
        ctx.terminate();

        handler::execute(node_task(index_uuid, coprocessors), ctx, services, callback.clone())
            .await;

        assert!(callback.results().is_empty());
        assert!(callback.failures().is_empty());
    }

    // ============================================================
    // SERIALIZATION TESTS
    // ============================================================

    #[test]
    fn test_node_result_bincode_round_trip() {
        let mut payloads = HashMap::new();
        payloads.insert(
            CoprocessorKey::new("events-1"),
            Payload::EventRefs(vec![crate::coprocessor::types::EventRef {
                stream_id: 3,
                event_id: 9,
            }]),
        );
        let result = NodeResult {
            payloads,
            errors: vec!["Shard 2: corrupt".to_string()],
            complete: true,
            sequence: 4,
        };

        let bytes = bincode::serialize(&result).unwrap();
        let restored: NodeResult = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.errors, result.errors);
        assert!(restored.complete);
        assert_eq!(restored.sequence, 4);
        assert_eq!(restored.payloads.len(), 1);
    }

    #[test]
    fn test_node_search_task_json_round_trip() {
        let mut coprocessors = HashMap::new();
        coprocessors.insert(CoprocessorKey::new("table-1"), count_by_user());
        let task = node_task(Uuid::new_v4(), coprocessors);

        let json = serde_json::to_string(&task).unwrap();
        let restored: NodeSearchTask = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.query_key, task.query_key);
        assert_eq!(restored.shard_ids, task.shard_ids);
        assert_eq!(restored.stored_fields, task.stored_fields);
    }
}
