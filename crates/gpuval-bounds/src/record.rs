// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Aggregate records and the non-owning handles handed to collaborators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use thiserror::Error;

use crate::detail::DetailRecord;
use crate::key::AggregateKey;

/// Resolved source location of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderLocation {
    /// Shader identity (directory key).
    pub shader_uid: u64,
    /// Source file within the shader.
    pub file_uid: u32,
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
}

/// A second resolution was attempted; the first one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record {key} already resolved to shader {:#x}", existing.shader_uid)]
pub struct AlreadyResolved {
    /// Record key.
    pub key: AggregateKey,
    /// Location that won.
    pub existing: ShaderLocation,
}

/// One deduplicated diagnostic class.
///
/// Shared between the ingestion thread (count, detail) and the resolver
/// (location). The count only grows; detail and location are set at most once.
#[derive(Debug)]
pub struct AggregateRecord {
    key: AggregateKey,
    description: String,
    count: AtomicU64,
    detail: OnceLock<Arc<DetailRecord>>,
    location: OnceLock<ShaderLocation>,
}

impl AggregateRecord {
    pub(crate) fn new(key: AggregateKey, description: String) -> Self {
        Self {
            key,
            description,
            count: AtomicU64::new(0),
            detail: OnceLock::new(),
            location: OnceLock::new(),
        }
    }

    /// Deduplication key.
    pub fn key(&self) -> AggregateKey {
        self.key
    }

    /// Description derived from the first occurrence.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Occurrences flushed so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Detail store, once the first detail chunk arrived.
    pub fn detail(&self) -> Option<&Arc<DetailRecord>> {
        self.detail.get()
    }

    /// Resolved location, if any.
    pub fn location(&self) -> Option<ShaderLocation> {
        self.location.get().copied()
    }

    /// Set the resolved location. First resolution wins.
    pub fn resolve(&self, location: ShaderLocation) -> Result<(), AlreadyResolved> {
        self.location.set(location).map_err(|_| AlreadyResolved {
            key: self.key,
            existing: self.location().unwrap_or(location),
        })
    }

    pub(crate) fn add_count(&self, delta: u64) -> u64 {
        self.count.fetch_add(delta, Ordering::AcqRel) + delta
    }

    pub(crate) fn attach_detail(&self) -> &Arc<DetailRecord> {
        self.detail
            .get_or_init(|| Arc::new(DetailRecord::new(self.key)))
    }
}

/// Non-owning handle to a record, as handed to resolvers and sinks.
///
/// The table keeps records alive for the whole session; upgrading only fails
/// after the owning engine is torn down.
#[derive(Debug, Clone)]
pub struct RecordRef {
    key: AggregateKey,
    record: Weak<AggregateRecord>,
}

impl RecordRef {
    /// Downgrade a table-owned record.
    pub fn new(record: &Arc<AggregateRecord>) -> Self {
        Self {
            key: record.key(),
            record: Arc::downgrade(record),
        }
    }

    /// Record key.
    pub fn key(&self) -> AggregateKey {
        self.key
    }

    /// Strong reference, while the session is alive.
    pub fn upgrade(&self) -> Option<Arc<AggregateRecord>> {
        self.record.upgrade()
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.record, &other.record)
    }
}

impl Eq for RecordRef {}
