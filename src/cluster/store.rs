use crate::coprocessor::types::{
    AggValue, CoprocessorKey, CoprocessorSettings, EventRef, Payload,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Merged accumulation for one coprocessor key.
///
/// The shape mirrors the payload variant the key's component produces. All
/// merges are additive: a delta applied once is folded in permanently.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreData {
    Table(BTreeMap<Vec<String>, Vec<AggValue>>),
    EventRefs(BTreeSet<EventRef>),
}

/// Session-scoped, queryable accumulation of all coprocessor payloads for one
/// search, addressable by coprocessor key and readable mid-search.
pub struct SearchResultStore {
    entries: DashMap<CoprocessorKey, StoreData>,
    /// Event caps per event-ref component, used for the find-N early exit.
    event_targets: HashMap<CoprocessorKey, usize>,
}

impl SearchResultStore {
    /// Builds an empty accumulator per component, so every key is addressable
    /// from the first poll even before any payload arrives.
    pub fn new(settings: &HashMap<CoprocessorKey, CoprocessorSettings>) -> Arc<Self> {
        let entries = DashMap::new();
        let mut event_targets = HashMap::new();

        for (key, component) in settings {
            match component {
                CoprocessorSettings::Table(_) => {
                    entries.insert(key.clone(), StoreData::Table(BTreeMap::new()));
                }
                CoprocessorSettings::EventRef(event_ref) => {
                    entries.insert(key.clone(), StoreData::EventRefs(BTreeSet::new()));
                    event_targets.insert(key.clone(), event_ref.max_events);
                }
            }
        }

        Arc::new(Self {
            entries,
            event_targets,
        })
    }

    /// Folds one payload delta into the accumulator for `key`.
    pub fn apply(&self, key: &CoprocessorKey, payload: &Payload) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            tracing::warn!("Dropping payload for unknown component {:?}", key);
            return;
        };

        match (entry.value_mut(), payload) {
            (StoreData::Table(groups), Payload::Table(deltas)) => {
                for delta in deltas {
                    match groups.get_mut(&delta.group) {
                        Some(values) => {
                            for (value, incoming) in values.iter_mut().zip(delta.values.iter()) {
                                value.merge(incoming);
                            }
                        }
                        None => {
                            groups.insert(delta.group.clone(), delta.values.clone());
                        }
                    }
                }
            }
            (StoreData::EventRefs(refs), Payload::EventRefs(incoming)) => {
                refs.extend(incoming.iter().copied());
            }
            _ => {
                tracing::warn!("Dropping payload of mismatched shape for {:?}", key);
            }
        }
    }

    /// Current (possibly partial) merged result for one component.
    pub fn data(&self, key: &CoprocessorKey) -> Option<StoreData> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// True once any event-ref component has collected its target number of
    /// references; the coordinator uses this for the find-N early exit.
    pub fn should_terminate(&self) -> bool {
        self.event_targets.iter().any(|(key, &target)| {
            matches!(
                self.entries.get(key).as_deref(),
                Some(StoreData::EventRefs(refs)) if refs.len() >= target
            )
        })
    }
}
