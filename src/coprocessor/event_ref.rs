use super::types::{EventRef, EventRefSettings, Payload, EVENT_ID_FIELD, STREAM_ID_FIELD};
use crate::query::field_index::{FieldIndexMap, RawRow};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// Bounded, sorted accumulation of (stream, event) references.
///
/// Used by the find-N-events search variant: the caller only wants event
/// references within a bounded window, so acceptance honours hard caps on
/// total events, distinct streams and events per stream for the life of the
/// search, not just per snapshot window. Rows whose id fields fail to parse
/// are skipped silently.
pub struct EventRefCoprocessor {
    stream_slot: usize,
    event_slot: usize,
    settings: EventRefSettings,
    state: Mutex<EventRefState>,
}

#[derive(Default)]
struct EventRefState {
    /// References accepted but not yet shipped in a payload.
    pending: BTreeMap<u64, BTreeSet<u64>>,
    pending_total: usize,
    /// Lifetime acceptance counts, never reset by snapshots.
    accepted_per_stream: BTreeMap<u64, usize>,
    accepted_total: usize,
}

impl EventRefCoprocessor {
    pub fn new(settings: &EventRefSettings, field_index: &mut FieldIndexMap) -> Self {
        Self {
            stream_slot: field_index.create(STREAM_ID_FIELD),
            event_slot: field_index.create(EVENT_ID_FIELD),
            settings: settings.clone(),
            state: Mutex::new(EventRefState::default()),
        }
    }

    pub fn receive(&self, row: &RawRow) {
        let Some(stream_id) = parse_slot(row, self.stream_slot) else {
            return;
        };
        let Some(event_id) = parse_slot(row, self.event_slot) else {
            return;
        };

        if event_id < self.settings.min_event || event_id > self.settings.max_event {
            return;
        }

        let mut state = self.state.lock();

        if state.accepted_total >= self.settings.max_events {
            return;
        }

        let known_stream = state.accepted_per_stream.contains_key(&stream_id);
        if !known_stream && state.accepted_per_stream.len() >= self.settings.max_streams {
            return;
        }
        let stream_count = state
            .accepted_per_stream
            .get(&stream_id)
            .copied()
            .unwrap_or(0);
        if stream_count >= self.settings.max_events_per_stream {
            return;
        }

        if state.pending.entry(stream_id).or_default().insert(event_id) {
            state.pending_total += 1;
            state.accepted_total += 1;
            *state.accepted_per_stream.entry(stream_id).or_insert(0) += 1;
        }
    }

    pub fn create_payload(&self) -> Option<Payload> {
        let mut state = self.state.lock();
        if state.pending_total == 0 {
            return None;
        }

        let refs: Vec<EventRef> = state
            .pending
            .iter()
            .flat_map(|(&stream_id, events)| {
                events.iter().map(move |&event_id| EventRef {
                    stream_id,
                    event_id,
                })
            })
            .collect();

        state.pending.clear();
        state.pending_total = 0;

        Some(Payload::EventRefs(refs))
    }
}

fn parse_slot(row: &RawRow, slot: usize) -> Option<u64> {
    row.get(slot)
        .and_then(|value| value.as_deref())
        .and_then(|value| value.parse::<u64>().ok())
}
