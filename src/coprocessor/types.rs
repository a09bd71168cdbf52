use crate::query::types::PipelineRef;
use serde::{Deserialize, Serialize};

/// Field holding the id of the stream (source document) a row came from.
pub const STREAM_ID_FIELD: &str = "StreamId";
/// Field holding the id of the event within its stream.
pub const EVENT_ID_FIELD: &str = "EventId";

/// Identifies a named result-set/component within a multi-component query.
/// Stable for the lifetime of one search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CoprocessorKey(pub String);

impl CoprocessorKey {
    pub fn new(component_id: impl Into<String>) -> Self {
        Self(component_id.into())
    }
}

/// Per-key configuration determining which coprocessor variant is built and
/// whether its rows pass through an extraction pipeline first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoprocessorSettings {
    Table(TableSettings),
    EventRef(EventRefSettings),
}

impl CoprocessorSettings {
    /// The extraction pipeline this component requires, if any. Components
    /// without one are fed raw rows on the direct-transfer path.
    pub fn extraction(&self) -> Option<&PipelineRef> {
        match self {
            Self::Table(table) => table.extraction.as_ref(),
            Self::EventRef(_) => None,
        }
    }
}

/// Aggregation definition for a table component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSettings {
    /// Fields whose values form the group key.
    pub group_fields: Vec<String>,
    /// Aggregates computed per group, in column order.
    pub aggregates: Vec<Aggregate>,
    /// Cap on distinct groups held between snapshots; new groups beyond the
    /// cap are dropped, updates to existing groups still apply.
    pub max_results: Option<usize>,
    /// Extraction pipeline feeding this component, if extraction is required.
    pub extraction: Option<PipelineRef>,
}

/// One aggregate column of a table component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Aggregate {
    Count,
    Sum(String),
    Min(String),
    Max(String),
}

/// Bounds for an event-reference component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRefSettings {
    pub min_event: u64,
    pub max_event: u64,
    pub max_streams: usize,
    pub max_events: usize,
    pub max_events_per_stream: usize,
}

/// A (stream, event) reference. Ordering is stream id first, then event id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventRef {
    pub stream_id: u64,
    pub event_id: u64,
}

/// Running aggregate value for one column of one group.
///
/// Merging two states of the same column is commutative and associative,
/// which is what makes cross-node payload merge order-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AggValue {
    Count(u64),
    Sum(f64),
    Min(Option<f64>),
    Max(Option<f64>),
}

impl AggValue {
    /// Fresh state for an aggregate column.
    pub fn initial(aggregate: &Aggregate) -> Self {
        match aggregate {
            Aggregate::Count => Self::Count(0),
            Aggregate::Sum(_) => Self::Sum(0.0),
            Aggregate::Min(_) => Self::Min(None),
            Aggregate::Max(_) => Self::Max(None),
        }
    }

    /// Folds another state of the same column into this one. Mismatched
    /// variants leave this state unchanged.
    pub fn merge(&mut self, other: &AggValue) {
        match (self, other) {
            (Self::Count(a), Self::Count(b)) => *a += b,
            (Self::Sum(a), Self::Sum(b)) => *a += b,
            (Self::Min(a), Self::Min(Some(b))) => {
                *a = Some(a.map_or(*b, |current| current.min(*b)));
            }
            (Self::Max(a), Self::Max(Some(b))) => {
                *a = Some(a.map_or(*b, |current| current.max(*b)));
            }
            _ => {}
        }
    }
}

/// Accumulated values for one group, shipped inside a table payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupDelta {
    pub group: Vec<String>,
    pub values: Vec<AggValue>,
}

/// Serializable incremental delta of coprocessor state sent node-to-collector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Payload {
    Table(Vec<GroupDelta>),
    EventRefs(Vec<EventRef>),
}
