// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Aggregate table: one record per key for the life of a session.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::key::AggregateKey;
use crate::record::{AggregateRecord, ShaderLocation};

/// Owner of every [`AggregateRecord`] in a session.
///
/// Strong references live here only; collaborators get [`crate::RecordRef`].
/// Records are never removed.
#[derive(Debug, Default)]
pub struct AggregateTable {
    records: FxHashMap<AggregateKey, Arc<AggregateRecord>>,
}

/// Point-in-time copy of one record, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// Record key.
    pub key: AggregateKey,
    /// Record description.
    pub description: String,
    /// Occurrence count.
    pub count: u64,
    /// Number of resources with detail instances.
    pub detail_resources: usize,
    /// Resolved location, if any.
    pub location: Option<ShaderLocation>,
}

impl AggregateTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record for `key`, creating it with `describe()` if absent.
    ///
    /// The boolean is `true` when the record was created by this call.
    /// `describe` runs only on creation.
    pub fn lookup_or_create<F>(&mut self, key: AggregateKey, describe: F) -> (Arc<AggregateRecord>, bool)
    where
        F: FnOnce() -> String,
    {
        if let Some(existing) = self.records.get(&key) {
            return (Arc::clone(existing), false);
        }
        let record = Arc::new(AggregateRecord::new(key, describe()));
        self.records.insert(key, Arc::clone(&record));
        (record, true)
    }

    /// Add `delta` to the count of `key` and return the record with its new
    /// total. Unknown keys are ignored.
    pub fn increment(&self, key: AggregateKey, delta: u64) -> Option<(&Arc<AggregateRecord>, u64)> {
        let record = self.records.get(&key)?;
        let total = record.add_count(delta);
        Some((record, total))
    }

    /// Record for `key`.
    pub fn get(&self, key: AggregateKey) -> Option<&Arc<AggregateRecord>> {
        self.records.get(&key)
    }

    /// Whether `key` has a record.
    pub fn contains(&self, key: AggregateKey) -> bool {
        self.records.contains_key(&key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record exists yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keys in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = AggregateKey> + '_ {
        self.records.keys().copied()
    }

    /// Records in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AggregateRecord>> + '_ {
        self.records.values()
    }

    /// Listing of all records, sorted by key.
    pub fn snapshot(&self) -> Vec<RecordSnapshot> {
        let mut out: Vec<RecordSnapshot> = self
            .records
            .values()
            .map(|r| RecordSnapshot {
                key: r.key(),
                description: r.description().to_owned(),
                count: r.count(),
                detail_resources: r.detail().map_or(0, |d| d.resource_count()),
                location: r.location(),
            })
            .collect();
        out.sort_by_key(|s| s.key);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_runs_only_on_creation() {
        let mut table = AggregateTable::new();
        let mut calls = 0;
        let (first, created) = table.lookup_or_create(AggregateKey(1), || {
            calls += 1;
            "first".into()
        });
        assert!(created);
        let (again, created) = table.lookup_or_create(AggregateKey(1), || {
            calls += 1;
            "second".into()
        });
        assert!(!created);
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.description(), "first");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn new_records_start_at_zero() {
        let mut table = AggregateTable::new();
        let (record, _) = table.lookup_or_create(AggregateKey(5), String::new);
        assert_eq!(record.count(), 0);
    }

    #[test]
    fn increment_unknown_key_is_noop() {
        let mut table = AggregateTable::new();
        assert!(table.increment(AggregateKey(9), 3).is_none());
        assert!(table.is_empty());

        table.lookup_or_create(AggregateKey(9), String::new);
        assert!(table.contains(AggregateKey(9)));
        assert_eq!(table.increment(AggregateKey(9), 3).map(|(_, total)| total), Some(3));
        assert_eq!(table.increment(AggregateKey(9), 4).map(|(_, total)| total), Some(7));
        assert_eq!(table.get(AggregateKey(9)).map(|r| r.count()), Some(7));
    }

    #[test]
    fn iter_visits_every_record() {
        let mut table = AggregateTable::new();
        for k in [3, 1, 2] {
            table.lookup_or_create(AggregateKey(k), String::new);
        }
        table.increment(AggregateKey(2), 5);
        let mut seen: Vec<_> = table.iter().map(|r| (r.key().0, r.count())).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![(1, 0), (2, 5), (3, 0)]);
        assert!(!table.contains(AggregateKey(4)));
    }

    #[test]
    fn snapshot_sorted_by_key() {
        let mut table = AggregateTable::new();
        for k in [30, 10, 20] {
            table.lookup_or_create(AggregateKey(k), || format!("k{k}"));
        }
        let keys: Vec<_> = table.snapshot().into_iter().map(|s| s.key.0).collect();
        assert_eq!(keys, vec![10, 20, 30]);
    }
}
