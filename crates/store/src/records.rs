//! Append-only, key-deduplicated record store.

use std::collections::HashSet;

use crate::models::{DedupKey, ParsedEvent};

/// Ordered sequence of decoded events plus the index of keys it holds.
///
/// No two records share a [`DedupKey`]. Records are never removed or
/// reordered once appended.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<ParsedEvent>,
    index: HashSet<DedupKey>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.index.contains(key)
    }

    /// Append `event` unless its key is already stored.
    ///
    /// # Returns
    /// `true` if the event was appended
    pub fn append(&mut self, event: ParsedEvent) -> bool {
        if !self.index.insert(event.dedup_key()) {
            return false;
        }
        self.records.push(event);
        true
    }

    pub fn records(&self) -> &[ParsedEvent] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ordering key of the most recently appended record.
    pub fn last_order_key(&self) -> Option<(u64, u64)> {
        self.records.last().map(ParsedEvent::order_key)
    }

    /// Whether records are in non-decreasing `(block, log index)` order.
    pub fn is_ordered(&self) -> bool {
        self.records
            .windows(2)
            .all(|pair| pair[0].order_key() <= pair[1].order_key())
    }
}
