// Record store - the one shared mutable collection of detections and alerts
//
// All ingestion paths funnel into the two mutation operations here; everything
// downstream (aggregation, layer composition) reads snapshots. Insertion order
// is preserved so the rendering surface gets a stable ordering across
// refreshes.

use std::collections::HashMap;

use thiserror::Error;

use crate::record::{Category, Record, ValidationError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record rejected: {0}")]
    Invalid(#[from] ValidationError),
}

/// De-duplicated, insertion-ordered record collection.
pub struct RecordStore {
    /// id -> record.
    records: HashMap<String, Record>,
    /// Insertion order of ids, kept in lockstep with `records`.
    order: Vec<String>,
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore {
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_category(&self, category: Category) -> usize {
        self.records
            .values()
            .filter(|r| r.category == category)
            .count()
    }

    /// Insert a record, or replace an existing one with the same id when the
    /// incoming record outranks it: push-sourced, or strictly newer by
    /// timestamp. Returns whether the collection changed, so callers can
    /// decide whether downstream state needs re-deriving.
    pub fn merge_insert(&mut self, record: Record) -> Result<bool, StoreError> {
        record.validate()?;

        match self.records.get(&record.id) {
            Some(existing) => {
                let wins = record.tier == crate::record::SourceTier::Push
                    || record.timestamp > existing.timestamp;
                if !wins {
                    return Ok(false);
                }
                // Replace in place; the id keeps its original order slot.
                self.records.insert(record.id.clone(), record);
                Ok(true)
            }
            None => {
                self.order.push(record.id.clone());
                self.records.insert(record.id.clone(), record);
                Ok(true)
            }
        }
    }

    /// Atomically evict every record of `category` and insert the replacement
    /// batch. Used for full-refresh sources: the incoming batch is the whole
    /// truth for that category, so nothing is merged field-by-field.
    ///
    /// Invalid records and ids that would collide with another category are
    /// skipped; the number of records actually inserted is returned.
    pub fn replace_category(&mut self, category: Category, batch: Vec<Record>) -> usize {
        self.order.retain(|id| {
            self.records
                .get(id)
                .map_or(false, |r| r.category != category)
        });
        self.records.retain(|_, r| r.category != category);

        let mut inserted = 0;
        for record in batch {
            if record.category != category || record.validate().is_err() {
                continue;
            }
            if self.records.contains_key(&record.id) {
                // Collision with a record outside the category; keep the
                // uniqueness invariant and drop the newcomer.
                continue;
            }
            self.order.push(record.id.clone());
            self.records.insert(record.id.clone(), record);
            inserted += 1;
        }
        inserted
    }

    /// Full ordered collection, cloned out. Callers never mutate store
    /// contents directly; everything goes through the operations above.
    pub fn snapshot(&self) -> Vec<Record> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
