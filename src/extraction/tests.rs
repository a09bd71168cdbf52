//! Extraction Module Tests
//!
//! Validates the transfer-queue consumer: direct transfer to extractionless
//! coprocessors, pipeline-based extraction, and failure isolation.
//!
//! ## Test Scopes
//! - **Pipelines**: The field-mapping fallback and provider registration.
//! - **Producer**: Routing, completion on a closed queue, error reporting.

#[cfg(test)]
mod tests {
    use crate::coprocessor::types::{Aggregate, CoprocessorSettings, Payload, TableSettings};
    use crate::coprocessor::Coprocessor;
    use crate::extraction::pipeline::{
        ExtractionContext, ExtractionPipeline, FieldMappingPipeline, PipelineProvider,
        StaticPipelineProvider,
    };
    use crate::extraction::producer::ExtractionProducer;
    use crate::query::field_index::{FieldIndexMap, RawRow};
    use crate::query::types::PipelineRef;
    use crate::task::context::TaskContext;
    use crate::task::errors::ErrorQueue;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    /// Stored layout used throughout: [StreamId, EventId, User].
    fn stored_map() -> FieldIndexMap {
        let mut stored = FieldIndexMap::new();
        stored.create("StreamId");
        stored.create("EventId");
        stored.create("User");
        stored
    }

    fn stored_row(stream_id: u64, event_id: u64, user: &str) -> RawRow {
        vec![
            Some(stream_id.to_string()),
            Some(event_id.to_string()),
            Some(user.to_string()),
        ]
    }

    fn count_by_user(extraction: Option<PipelineRef>) -> CoprocessorSettings {
        CoprocessorSettings::Table(TableSettings {
            group_fields: vec!["User".to_string()],
            aggregates: vec![Aggregate::Count],
            max_results: None,
            extraction,
        })
    }

    struct FailingPipeline;

    impl ExtractionPipeline for FailingPipeline {
        fn extract(
            &self,
            _stream_id: u64,
            _rows: &[RawRow],
            _context: &ExtractionContext,
        ) -> anyhow::Result<Vec<RawRow>> {
            Err(anyhow!("pipeline exploded"))
        }
    }

    // ============================================================
    // PIPELINE TESTS
    // ============================================================

    #[test]
    fn test_field_mapping_pipeline_remaps_by_name() {
        let stored = Arc::new(stored_map());
        let mut extracted = FieldIndexMap::new();
        extracted.create("User");
        extracted.create("EventId");
        let context = ExtractionContext {
            stored,
            extracted: Arc::new(extracted),
        };

        let rows = vec![stored_row(1, 42, "alice")];
        let out = FieldMappingPipeline.extract(1, &rows, &context).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0].as_deref(), Some("alice"));
        assert_eq!(out[0][1].as_deref(), Some("42"));
    }

    #[test]
    fn test_provider_falls_back_to_field_mapping() {
        let provider = StaticPipelineProvider::new();
        let reference = PipelineRef {
            uuid: Uuid::new_v4(),
            name: "unregistered".to_string(),
        };

        // No registration: the fallback still resolves.
        assert!(provider.pipeline(&reference).is_ok());
    }

    // ============================================================
    // EXTRACTION PRODUCER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_direct_transfer_feeds_extractionless_coprocessors() {
        // ARRANGE: one extractionless table component over the stored layout
        let mut stored = stored_map();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(None), &mut stored));
        let mut buckets = HashMap::new();
        buckets.insert(None, vec![coprocessor.clone()]);

        let producer = ExtractionProducer::new(
            TaskContext::root(),
            buckets,
            StaticPipelineProvider::new(),
            Arc::new(stored),
            Arc::new(FieldIndexMap::new()),
            ErrorQueue::new(),
            2,
        );

        // ACT: feed rows, close the queue, wait for the drain
        let (tx, rx) = mpsc::channel(16);
        tx.send(stored_row(1, 1, "alice")).await.unwrap();
        tx.send(stored_row(1, 2, "alice")).await.unwrap();
        tx.send(stored_row(2, 1, "bob")).await.unwrap();
        drop(tx);
        producer.run(rx).await;

        // ASSERT
        let Some(Payload::Table(mut deltas)) = coprocessor.create_payload() else {
            panic!("expected a table payload");
        };
        deltas.sort_by(|a, b| a.group.cmp(&b.group));
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].group, vec!["alice".to_string()]);
        assert_eq!(deltas[1].group, vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn test_extraction_bucket_runs_pipeline_then_coprocessors() {
        // ARRANGE: a component that requires extraction; the provider resolves
        // to the field-mapping fallback
        let stored = stored_map();
        let reference = PipelineRef {
            uuid: Uuid::new_v4(),
            name: "remap".to_string(),
        };
        let mut extracted = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(
            &count_by_user(Some(reference.clone())),
            &mut extracted,
        ));
        let mut buckets = HashMap::new();
        buckets.insert(Some(reference), vec![coprocessor.clone()]);

        let producer = ExtractionProducer::new(
            TaskContext::root(),
            buckets,
            StaticPipelineProvider::new(),
            Arc::new(stored),
            Arc::new(extracted),
            ErrorQueue::new(),
            2,
        );

        // ACT
        let (tx, rx) = mpsc::channel(16);
        tx.send(stored_row(1, 1, "alice")).await.unwrap();
        tx.send(stored_row(1, 2, "bob")).await.unwrap();
        drop(tx);
        producer.run(rx).await;

        // ASSERT: rows arrived through the pipeline in the extracted layout
        let Some(Payload::Table(deltas)) = coprocessor.create_payload() else {
            panic!("expected a table payload");
        };
        assert_eq!(deltas.len(), 2);
    }

    #[tokio::test]
    async fn test_pipeline_failure_becomes_error_string() {
        // ARRANGE: registered pipeline that always fails
        let stored = stored_map();
        let reference = PipelineRef {
            uuid: Uuid::new_v4(),
            name: "broken".to_string(),
        };
        let provider = StaticPipelineProvider::new();
        provider.register(reference.uuid, Arc::new(FailingPipeline));

        let mut extracted = FieldIndexMap::new();
        let coprocessor = Arc::new(Coprocessor::create(
            &count_by_user(Some(reference.clone())),
            &mut extracted,
        ));
        let mut buckets = HashMap::new();
        buckets.insert(Some(reference), vec![coprocessor.clone()]);

        let errors = ErrorQueue::new();
        let producer = ExtractionProducer::new(
            TaskContext::root(),
            buckets,
            provider,
            Arc::new(stored),
            Arc::new(extracted),
            errors.clone(),
            2,
        );

        // ACT
        let (tx, rx) = mpsc::channel(16);
        tx.send(stored_row(7, 1, "alice")).await.unwrap();
        drop(tx);
        producer.run(rx).await;

        // ASSERT: the failure degrades to an error string, never a panic
        assert!(coprocessor.create_payload().is_none());
        let drained = errors.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].contains("stream 7"));
        assert!(drained[0].contains("broken"));
    }

    #[tokio::test]
    async fn test_producer_stops_on_termination() {
        let mut stored = stored_map();
        let coprocessor = Arc::new(Coprocessor::create(&count_by_user(None), &mut stored));
        let mut buckets = HashMap::new();
        buckets.insert(None, vec![coprocessor.clone()]);

        let ctx = TaskContext::root();
        ctx.terminate();

        let producer = ExtractionProducer::new(
            ctx,
            buckets,
            StaticPipelineProvider::new(),
            Arc::new(stored),
            Arc::new(FieldIndexMap::new()),
            ErrorQueue::new(),
            2,
        );

        let (tx, rx) = mpsc::channel(16);
        tx.send(stored_row(1, 1, "alice")).await.unwrap();
        producer.run(rx).await;

        // Terminated before consuming anything.
        assert!(coprocessor.create_payload().is_none());
    }
}
