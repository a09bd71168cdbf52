//! Coprocessor Module
//!
//! Coprocessors are per-search, per-component accumulators: they consume raw
//! positional rows produced by the shard/extraction pipeline and periodically
//! surrender a serializable [`types::Payload`] delta via snapshot-and-clear.
//! A payload is monotonic (data handed out once is never resent), so the
//! collector on the requesting node can apply deltas additively.
//!
//! The variant is resolved exactly once at construction from the tagged
//! [`types::CoprocessorSettings`] union; there is no runtime type sniffing.
//!
//! ## Submodules
//! - **`table`**: grouping/aggregation keyed by the query's group fields.
//! - **`event_ref`**: bounded, sorted collection of (stream, event) refs.
//! - **`types`**: keys, settings, payload and aggregate value types.

pub mod event_ref;
pub mod table;
pub mod types;


use crate::query::field_index::{FieldIndexMap, RawRow};
use event_ref::EventRefCoprocessor;
use table::TableCoprocessor;
use types::{CoprocessorSettings, Payload};

/// A result-set accumulator for one component of a search.
///
/// `receive` may be called concurrently from extraction workers while the
/// independent send-data loop calls `create_payload`; both variants guard
/// their state with a single short-lived lock.
pub enum Coprocessor {
    Table(TableCoprocessor),
    EventRef(EventRefCoprocessor),
}

impl Coprocessor {
    /// Builds the coprocessor variant for `settings`, resolving every field it
    /// needs to a slot in `field_index`.
    pub fn create(settings: &CoprocessorSettings, field_index: &mut FieldIndexMap) -> Self {
        match settings {
            CoprocessorSettings::Table(table) => {
                Self::Table(TableCoprocessor::new(table, field_index))
            }
            CoprocessorSettings::EventRef(event_ref) => {
                Self::EventRef(EventRefCoprocessor::new(event_ref, field_index))
            }
        }
    }

    /// Consumes one raw row. Malformed values are skipped per-row and never
    /// escalate.
    pub fn receive(&self, row: &RawRow) {
        match self {
            Self::Table(table) => table.receive(row),
            Self::EventRef(event_ref) => event_ref.receive(row),
        }
    }

    /// Snapshot-and-clear of accumulated state. Returns `None` when nothing
    /// has arrived since the previous snapshot.
    pub fn create_payload(&self) -> Option<Payload> {
        match self {
            Self::Table(table) => table.create_payload(),
            Self::EventRef(event_ref) => event_ref.create_payload(),
        }
    }
}
