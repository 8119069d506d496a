// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Location resolver fake.

use std::sync::Mutex;

use gpuval_bounds::{LocationResolver, RecordRef, ShaderLocation};
use gpuval_message_proto::ShaderGuid;

/// [`LocationResolver`] that only remembers what was enqueued.
///
/// Tests drive resolution explicitly with [`resolve_all`](Self::resolve_all).
#[derive(Debug, Default)]
pub struct RecordingResolver {
    enqueued: Mutex<Vec<(RecordRef, ShaderGuid)>>,
}

impl RecordingResolver {
    /// Empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything enqueued so far, in order.
    pub fn enqueued(&self) -> Vec<(RecordRef, ShaderGuid)> {
        self.enqueued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of enqueue calls.
    pub fn len(&self) -> usize {
        self.enqueued.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing was enqueued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every enqueued record with `locate(guid)`. Returns how many
    /// resolutions were accepted.
    pub fn resolve_all<F>(&self, mut locate: F) -> usize
    where
        F: FnMut(ShaderGuid) -> ShaderLocation,
    {
        self.enqueued()
            .into_iter()
            .filter_map(|(record, guid)| record.upgrade().map(|r| (r, guid)))
            .filter(|(record, guid)| record.resolve(locate(*guid)).is_ok())
            .count()
    }
}

impl LocationResolver for RecordingResolver {
    fn enqueue(&self, record: RecordRef, routing: ShaderGuid) {
        self.enqueued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((record, routing));
    }
}
