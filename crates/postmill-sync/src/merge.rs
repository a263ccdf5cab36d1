//! Identity-keyed, newest-first record collections.

use std::collections::{HashSet, VecDeque};

use postmill_core::{identity_key, MergeOutcome, Record};

/// A persisted collection plus the set of identity keys it already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    identity_field: &'static str,
    records: VecDeque<Record>,
    keys: HashSet<String>,
}

impl Collection {
    pub fn new(identity_field: &'static str) -> Self {
        Self::from_records(identity_field, Vec::new())
    }

    /// Wrap a loaded collection. Records without a usable key are kept as-is.
    pub fn from_records(identity_field: &'static str, records: Vec<Record>) -> Self {
        let keys = records
            .iter()
            .filter_map(|record| identity_key(record, identity_field))
            .collect();
        Self {
            identity_field,
            records: records.into(),
            keys,
        }
    }

    pub fn identity_field(&self) -> &'static str {
        self.identity_field
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into()
    }

    /// Prepend `record` unless its identity key is already present.
    pub fn merge(mut self, record: Record) -> (Self, MergeOutcome) {
        let Some(key) = identity_key(&record, self.identity_field) else {
            return (self, MergeOutcome::MissingIdentity);
        };
        if !self.keys.insert(key) {
            return (self, MergeOutcome::SkippedDuplicate);
        }
        self.records.push_front(record);
        (self, MergeOutcome::Inserted)
    }
}
