use std::collections::HashMap;

/// Name-to-slot mapping shared by producers and coprocessors.
///
/// Raw rows produced by the shard and extraction producers are plain positional
/// arrays; this map is built once during node task setup, assigning a slot to
/// each field the first time it is requested, and is treated as immutable
/// afterwards so it can be read concurrently without locks.
#[derive(Debug, Default, Clone)]
pub struct FieldIndexMap {
    slots: HashMap<String, usize>,
}

impl FieldIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `field`, assigning the next free one if the field
    /// has not been seen before. Only called during setup.
    pub fn create(&mut self, field: &str) -> usize {
        let next = self.slots.len();
        *self.slots.entry(field.to_string()).or_insert(next)
    }

    pub fn get(&self, field: &str) -> Option<usize> {
        self.slots.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// All (field, slot) assignments, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, usize)> {
        self.slots.iter().map(|(name, &slot)| (name.as_str(), slot))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A positional row of raw field values, addressed via [`FieldIndexMap`].
/// `None` marks a field the source document did not store.
pub type RawRow = Vec<Option<String>>;
