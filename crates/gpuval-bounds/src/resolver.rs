// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Location resolution hand-off.
//!
//! The engine enqueues each newly created record exactly once. Resolution may
//! complete on any thread, before or after the mapping for a shader is known;
//! it writes the record's location through the set-once
//! [`AggregateRecord::resolve`](crate::AggregateRecord::resolve).

use std::sync::{Arc, Mutex, PoisonError};

use gpuval_message_proto::ShaderGuid;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::record::{RecordRef, ShaderLocation};
use crate::shader::ShaderDirectory;

/// Receives records that need a source location.
///
/// `enqueue` must not block: hand the record off and return.
pub trait LocationResolver: Send + Sync {
    /// Queue `record` for resolution using `routing` to find its shader.
    fn enqueue(&self, record: RecordRef, routing: ShaderGuid);
}

/// Resolver that never resolves anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

impl LocationResolver for NoopResolver {
    fn enqueue(&self, _record: RecordRef, _routing: ShaderGuid) {}
}

#[derive(Debug, Default)]
struct PendingState {
    mappings: FxHashMap<ShaderGuid, ShaderLocation>,
    waiting: FxHashMap<ShaderGuid, Vec<RecordRef>>,
}

/// Resolver that matches records against shader mappings as they arrive.
///
/// Records whose guid has no mapping yet wait until
/// [`register_mapping`](Self::register_mapping) supplies one.
#[derive(Default)]
pub struct PendingLocationMap {
    state: Mutex<PendingState>,
    directory: Option<Arc<dyn ShaderDirectory>>,
}

impl std::fmt::Debug for PendingLocationMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLocationMap")
            .field("state", &self.state)
            .field("directory", &self.directory.is_some())
            .finish()
    }
}

impl PendingLocationMap {
    /// Map without a shader directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map that attaches every resolved record to its shader in `directory`.
    pub fn with_directory(directory: Arc<dyn ShaderDirectory>) -> Self {
        Self {
            state: Mutex::new(PendingState::default()),
            directory: Some(directory),
        }
    }

    /// Record the location for `guid` and resolve every record waiting on it.
    ///
    /// Returns the number of records resolved by this call. A later mapping
    /// for the same guid replaces the stored one but never changes a record
    /// that is already resolved.
    pub fn register_mapping(&self, guid: ShaderGuid, location: ShaderLocation) -> usize {
        let waiting = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.mappings.insert(guid, location);
            state.waiting.remove(&guid).unwrap_or_default()
        };
        let resolved = waiting
            .into_iter()
            .filter(|record| self.apply(record, location))
            .count();
        debug!(guid = guid.0, resolved, "shader mapping registered");
        resolved
    }

    /// Records still waiting for a mapping.
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiting
            .values()
            .map(Vec::len)
            .sum()
    }

    fn apply(&self, record: &RecordRef, location: ShaderLocation) -> bool {
        let Some(strong) = record.upgrade() else {
            trace!(key = %record.key(), "record gone before resolution");
            return false;
        };
        if let Err(err) = strong.resolve(location) {
            trace!(%err, "resolution rejected");
            return false;
        }
        if let Some(directory) = &self.directory {
            directory
                .get_or_add_by_identity(location.shader_uid)
                .attach(record.clone());
        }
        true
    }
}

impl LocationResolver for PendingLocationMap {
    fn enqueue(&self, record: RecordRef, routing: ShaderGuid) {
        let known = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match state.mappings.get(&routing).copied() {
                Some(location) => Some(location),
                None => {
                    state.waiting.entry(routing).or_default().push(record.clone());
                    None
                }
            }
        };
        if let Some(location) = known {
            self.apply(&record, location);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::AggregateKey;
    use crate::record::AggregateRecord;
    use crate::shader::InMemoryShaderDirectory;

    fn record(key: u32) -> Arc<AggregateRecord> {
        Arc::new(AggregateRecord::new(AggregateKey(key), "x".into()))
    }

    fn loc(shader_uid: u64, line: u32) -> ShaderLocation {
        ShaderLocation {
            shader_uid,
            file_uid: 1,
            line,
            column: 4,
        }
    }

    #[test]
    fn enqueue_before_mapping_waits() {
        let map = PendingLocationMap::new();
        let r = record(1);
        map.enqueue(RecordRef::new(&r), ShaderGuid(7));
        assert_eq!(map.pending_len(), 1);
        assert!(r.location().is_none());

        assert_eq!(map.register_mapping(ShaderGuid(7), loc(70, 3)), 1);
        assert_eq!(r.location(), Some(loc(70, 3)));
        assert_eq!(map.pending_len(), 0);
    }

    #[test]
    fn enqueue_after_mapping_resolves_immediately() {
        let map = PendingLocationMap::new();
        map.register_mapping(ShaderGuid(7), loc(70, 3));
        let r = record(1);
        map.enqueue(RecordRef::new(&r), ShaderGuid(7));
        assert_eq!(r.location(), Some(loc(70, 3)));
        assert_eq!(map.pending_len(), 0);
    }

    #[test]
    fn remapping_does_not_overwrite() {
        let map = PendingLocationMap::new();
        let r = record(1);
        map.register_mapping(ShaderGuid(7), loc(70, 3));
        map.enqueue(RecordRef::new(&r), ShaderGuid(7));
        map.register_mapping(ShaderGuid(7), loc(71, 9));
        assert_eq!(r.location(), Some(loc(70, 3)));
    }

    #[test]
    fn resolved_records_attach_to_shader() {
        let dir = Arc::new(InMemoryShaderDirectory::new());
        let map = PendingLocationMap::with_directory(dir.clone());
        let a = record(1);
        let b = record(2);
        map.enqueue(RecordRef::new(&a), ShaderGuid(7));
        map.enqueue(RecordRef::new(&b), ShaderGuid(8));
        map.register_mapping(ShaderGuid(7), loc(70, 0));

        let shader = dir.get(70).unwrap();
        let keys: Vec<_> = shader.records().iter().map(RecordRef::key).collect();
        assert_eq!(keys, vec![AggregateKey(1)]);
        assert_eq!(map.pending_len(), 1);
    }

    #[test]
    fn dropped_records_are_skipped() {
        let map = PendingLocationMap::new();
        let r = record(1);
        map.enqueue(RecordRef::new(&r), ShaderGuid(7));
        drop(r);
        assert_eq!(map.register_mapping(ShaderGuid(7), loc(70, 0)), 0);
    }
}
