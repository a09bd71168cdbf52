use crate::query::field_index::{FieldIndexMap, RawRow};
use crate::query::types::PipelineRef;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Field maps an extraction call translates between.
pub struct ExtractionContext {
    /// Slot layout of the incoming raw rows.
    pub stored: Arc<FieldIndexMap>,
    /// Slot layout the extracted rows must use.
    pub extracted: Arc<FieldIndexMap>,
}

/// A per-document transformation from stored raw rows to field-mapped rows.
///
/// The concrete document parsing/transformation logic is an external
/// collaborator; the engine only relies on this contract. Implementations
/// must be safe to call from multiple extraction workers at once.
pub trait ExtractionPipeline: Send + Sync {
    /// Transforms the rows of one stream. Returned rows are positioned by
    /// `context.extracted`.
    fn extract(&self, stream_id: u64, rows: &[RawRow], context: &ExtractionContext)
        -> Result<Vec<RawRow>>;
}

/// Default pipeline: re-maps stored values into the extraction slots by field
/// name, one output row per input row.
pub struct FieldMappingPipeline;

impl ExtractionPipeline for FieldMappingPipeline {
    fn extract(
        &self,
        _stream_id: u64,
        rows: &[RawRow],
        context: &ExtractionContext,
    ) -> Result<Vec<RawRow>> {
        let out = rows
            .iter()
            .map(|row| {
                let mut mapped: RawRow = vec![None; context.extracted.len()];
                for (field, slot) in context.stored.entries() {
                    if let Some(target) = context.extracted.get(field) {
                        mapped[target] = row.get(slot).and_then(|value| value.clone());
                    }
                }
                mapped
            })
            .collect();
        Ok(out)
    }
}

/// Resolves pipeline references to implementations.
pub trait PipelineProvider: Send + Sync {
    fn pipeline(&self, reference: &PipelineRef) -> Result<Arc<dyn ExtractionPipeline>>;
}

/// Registry-backed provider with a field-mapping fallback for references that
/// have no registered implementation.
#[derive(Default)]
pub struct StaticPipelineProvider {
    pipelines: DashMap<Uuid, Arc<dyn ExtractionPipeline>>,
}

impl StaticPipelineProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, uuid: Uuid, pipeline: Arc<dyn ExtractionPipeline>) {
        self.pipelines.insert(uuid, pipeline);
    }
}

impl PipelineProvider for StaticPipelineProvider {
    fn pipeline(&self, reference: &PipelineRef) -> Result<Arc<dyn ExtractionPipeline>> {
        if let Some(pipeline) = self.pipelines.get(&reference.uuid) {
            return Ok(pipeline.value().clone());
        }
        Ok(Arc::new(FieldMappingPipeline))
    }
}
