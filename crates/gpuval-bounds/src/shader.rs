// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shader directory: records attached to each resolved shader.

use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;

use crate::record::RecordRef;

/// Records that resolved into one shader.
#[derive(Debug)]
pub struct ShaderHandle {
    uid: u64,
    records: Mutex<Vec<RecordRef>>,
}

impl ShaderHandle {
    /// Empty handle for `uid`.
    pub fn new(uid: u64) -> Self {
        Self {
            uid,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Shader identity.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Attach a record. Returns `false` if a record with the same key is already attached.
    pub fn attach(&self, record: RecordRef) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.iter().any(|r| r.key() == record.key()) {
            return false;
        }
        records.push(record);
        true
    }

    /// Attached records, in attach order.
    pub fn records(&self) -> Vec<RecordRef> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Lookup of shader handles by identity.
pub trait ShaderDirectory: Send + Sync {
    /// Handle for `uid`, created on first request.
    fn get_or_add_by_identity(&self, uid: u64) -> Arc<ShaderHandle>;
}

/// Process-local [`ShaderDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryShaderDirectory {
    shaders: Mutex<FxHashMap<u64, Arc<ShaderHandle>>>,
}

impl InMemoryShaderDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing handle for `uid`.
    pub fn get(&self, uid: u64) -> Option<Arc<ShaderHandle>> {
        self.shaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uid)
            .cloned()
    }

    /// Number of shaders known.
    pub fn len(&self) -> usize {
        self.shaders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no shader is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ShaderDirectory for InMemoryShaderDirectory {
    fn get_or_add_by_identity(&self, uid: u64) -> Arc<ShaderHandle> {
        let mut shaders = self.shaders.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            shaders
                .entry(uid)
                .or_insert_with(|| Arc::new(ShaderHandle::new(uid))),
        )
    }
}
