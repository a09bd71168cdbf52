use super::types::{AggValue, Aggregate, GroupDelta, Payload, TableSettings};
use crate::query::field_index::{FieldIndexMap, RawRow};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Grouping/aggregation coprocessor backing a dashboard table component.
///
/// Rows are folded into a group map keyed by the configured group fields.
/// `create_payload` drains the map, so every group delta leaves exactly once
/// and the collector-side merge is purely additive.
pub struct TableCoprocessor {
    group_slots: Vec<usize>,
    aggregates: Vec<(Aggregate, Option<usize>)>,
    max_results: Option<usize>,
    groups: Mutex<BTreeMap<Vec<String>, Vec<AggValue>>>,
}

impl TableCoprocessor {
    pub fn new(settings: &TableSettings, field_index: &mut FieldIndexMap) -> Self {
        let group_slots = settings
            .group_fields
            .iter()
            .map(|field| field_index.create(field))
            .collect();

        let aggregates = settings
            .aggregates
            .iter()
            .map(|aggregate| {
                let slot = match aggregate {
                    Aggregate::Count => None,
                    Aggregate::Sum(field) | Aggregate::Min(field) | Aggregate::Max(field) => {
                        Some(field_index.create(field))
                    }
                };
                (aggregate.clone(), slot)
            })
            .collect();

        Self {
            group_slots,
            aggregates,
            max_results: settings.max_results,
            groups: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn receive(&self, row: &RawRow) {
        let group: Vec<String> = self
            .group_slots
            .iter()
            .map(|&slot| slot_value(row, slot).unwrap_or_default())
            .collect();

        let mut groups = self.groups.lock();

        if !groups.contains_key(&group) {
            if let Some(max) = self.max_results {
                if groups.len() >= max {
                    // At capacity: existing groups keep updating, new ones drop.
                    return;
                }
            }
        }

        let values = groups.entry(group).or_insert_with(|| {
            self.aggregates
                .iter()
                .map(|(aggregate, _)| AggValue::initial(aggregate))
                .collect()
        });

        for (column, (aggregate, slot)) in self.aggregates.iter().enumerate() {
            match aggregate {
                Aggregate::Count => values[column].merge(&AggValue::Count(1)),
                Aggregate::Sum(_) => {
                    if let Some(value) = numeric_slot_value(row, *slot) {
                        values[column].merge(&AggValue::Sum(value));
                    }
                }
                Aggregate::Min(_) => {
                    if let Some(value) = numeric_slot_value(row, *slot) {
                        values[column].merge(&AggValue::Min(Some(value)));
                    }
                }
                Aggregate::Max(_) => {
                    if let Some(value) = numeric_slot_value(row, *slot) {
                        values[column].merge(&AggValue::Max(Some(value)));
                    }
                }
            }
        }
    }

    pub fn create_payload(&self) -> Option<Payload> {
        let drained = std::mem::take(&mut *self.groups.lock());
        if drained.is_empty() {
            return None;
        }

        let deltas = drained
            .into_iter()
            .map(|(group, values)| GroupDelta { group, values })
            .collect();
        Some(Payload::Table(deltas))
    }
}

fn slot_value(row: &RawRow, slot: usize) -> Option<String> {
    row.get(slot).and_then(|value| value.clone())
}

fn numeric_slot_value(row: &RawRow, slot: Option<usize>) -> Option<f64> {
    let slot = slot?;
    row.get(slot)
        .and_then(|value| value.as_deref())
        .and_then(|value| value.parse::<f64>().ok())
}
