// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Detail index: unique resource instances per aggregate key.
//!
//! A [`DetailRecord`] hangs off its aggregate record and maps resource tokens
//! to sets of instance descriptions. It refers back to its parent by key only;
//! navigation goes through [`DetailRecord::parent`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use gpuval_message_proto::{Coordinate, ResourceToken};
use rustc_hash::FxHashMap;

use crate::key::AggregateKey;
use crate::record::AggregateRecord;
use crate::table::AggregateTable;

/// Instance set for one resource.
#[derive(Debug)]
pub struct ResourceDetail {
    token: ResourceToken,
    instances: RwLock<BTreeSet<String>>,
}

impl ResourceDetail {
    fn new(token: ResourceToken) -> Self {
        Self {
            token,
            instances: RwLock::new(BTreeSet::new()),
        }
    }

    /// Resource token.
    pub fn token(&self) -> ResourceToken {
        self.token
    }

    /// Number of unique instances.
    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no instance is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `description` is stored.
    pub fn contains(&self, description: &str) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(description)
    }

    /// Sorted copy of the instance descriptions.
    pub fn instances(&self) -> Vec<String> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Per-key detail store.
#[derive(Debug)]
pub struct DetailRecord {
    key: AggregateKey,
    resources: RwLock<BTreeMap<ResourceToken, Arc<ResourceDetail>>>,
}

impl DetailRecord {
    pub(crate) fn new(key: AggregateKey) -> Self {
        Self {
            key,
            resources: RwLock::new(BTreeMap::new()),
        }
    }

    /// Key of the owning aggregate record.
    pub fn key(&self) -> AggregateKey {
        self.key
    }

    /// Look up the owning aggregate record.
    pub fn parent<'t>(&self, table: &'t AggregateTable) -> Option<&'t Arc<AggregateRecord>> {
        table.get(self.key)
    }

    /// Number of resources seen.
    pub fn resource_count(&self) -> usize {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Instance set for `token`.
    pub fn resource(&self, token: ResourceToken) -> Option<Arc<ResourceDetail>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token)
            .cloned()
    }

    /// Tokens in ascending order.
    pub fn tokens(&self) -> Vec<ResourceToken> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Instance descriptions for `token`; empty when unknown.
    pub fn instances(&self, token: ResourceToken) -> Vec<String> {
        self.resource(token)
            .map(|r| r.instances())
            .unwrap_or_default()
    }

    fn find_or_add(&self, token: ResourceToken) -> Arc<ResourceDetail> {
        let mut resources = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            resources
                .entry(token)
                .or_insert_with(|| Arc::new(ResourceDetail::new(token))),
        )
    }
}

/// Result of [`DetailIndex::add_unique_instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceInsert {
    /// New instance stored.
    Inserted,
    /// Already present; nothing changed.
    Duplicate,
    /// Resource is at its instance cap; dropped.
    CapReached,
}

impl InstanceInsert {
    /// Whether the instance was stored.
    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Render the instance description for a faulting coordinate.
pub fn format_instance(coordinate: Coordinate) -> String {
    format!("Out of bounds at {coordinate}")
}

/// Index of detail records by aggregate key.
#[derive(Debug, Default)]
pub struct DetailIndex {
    details: FxHashMap<AggregateKey, Arc<DetailRecord>>,
    max_instances_per_resource: Option<usize>,
}

impl DetailIndex {
    /// Unbounded index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that keeps at most `cap` instances per resource.
    pub fn with_instance_cap(cap: Option<usize>) -> Self {
        Self {
            details: FxHashMap::default(),
            max_instances_per_resource: cap,
        }
    }

    /// Instance set for (`key`, `token`), creating the detail record and the
    /// resource entry on first use.
    ///
    /// Returns `None` when `key` has no aggregate record. Nothing is created
    /// in that case.
    pub fn find_or_add_resource(
        &mut self,
        table: &AggregateTable,
        key: AggregateKey,
        token: ResourceToken,
    ) -> Option<Arc<ResourceDetail>> {
        let record = table.get(key)?;
        let detail = self
            .details
            .entry(key)
            .or_insert_with(|| Arc::clone(record.attach_detail()));
        Some(detail.find_or_add(token))
    }

    /// Insert `description` into `resource` unless already present or capped.
    pub fn add_unique_instance(&self, resource: &ResourceDetail, description: String) -> InstanceInsert {
        let mut instances = resource
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if instances.contains(&description) {
            return InstanceInsert::Duplicate;
        }
        if self
            .max_instances_per_resource
            .is_some_and(|cap| instances.len() >= cap)
        {
            return InstanceInsert::CapReached;
        }
        instances.insert(description);
        InstanceInsert::Inserted
    }

    /// Detail record for `key`.
    pub fn get(&self, key: AggregateKey) -> Option<&Arc<DetailRecord>> {
        self.details.get(&key)
    }

    /// Number of keys with detail records.
    pub fn len(&self) -> usize {
        self.details.len()
    }

    /// Whether no detail record exists.
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}
