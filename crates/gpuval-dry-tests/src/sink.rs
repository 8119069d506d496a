// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Publication sink that records what it was told.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use gpuval_bounds::{AggregateKey, Dispatcher, PublicationOp, PublicationSink, RecordRef};

/// One observed publication, reduced to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// `publish_insert`.
    Insert(AggregateKey),
    /// `publish_count_delta`.
    Delta(AggregateKey, u64),
}

impl SinkEvent {
    /// Key the event is about.
    pub fn key(self) -> AggregateKey {
        match self {
            Self::Insert(key) | Self::Delta(key, _) => key,
        }
    }
}

/// [`PublicationSink`] that appends every call to a log.
///
/// Also keeps the count a consumer would show for each key, built only from
/// delivered events.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
    refs: Vec<RecordRef>,
    shown: BTreeMap<AggregateKey, u64>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in arrival order.
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Record handles in arrival order, one per event.
    pub fn refs(&self) -> &[RecordRef] {
        &self.refs
    }

    /// Number of inserts for `key`.
    pub fn inserts_for(&self, key: AggregateKey) -> usize {
        self.events
            .iter()
            .filter(|e| **e == SinkEvent::Insert(key))
            .count()
    }

    /// Sum of published deltas for `key`.
    pub fn delta_total(&self, key: AggregateKey) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                SinkEvent::Delta(k, d) if *k == key => *d,
                _ => 0,
            })
            .sum()
    }

    /// Count for `key` as delivered so far; `None` before its insert.
    pub fn shown_count(&self, key: AggregateKey) -> Option<u64> {
        self.shown.get(&key).copied()
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        self.events.clear();
        self.refs.clear();
        self.shown.clear();
    }
}

impl PublicationSink for RecordingSink {
    fn publish_insert(&mut self, record: RecordRef) {
        self.events.push(SinkEvent::Insert(record.key()));
        self.shown.insert(record.key(), 0);
        self.refs.push(record);
    }

    fn publish_count_delta(&mut self, record: RecordRef, delta: u64, total: u64) {
        self.events.push(SinkEvent::Delta(record.key(), delta));
        self.shown.insert(record.key(), total);
        self.refs.push(record);
    }
}

/// Dispatcher that applies ops to a shared sink on the calling thread.
///
/// Only for tests and single-threaded hosts: the sink runs on the ingestion
/// thread, so it sees counts exactly as they are flushed.
#[derive(Debug)]
pub struct InlineDispatcher<S> {
    sink: Arc<Mutex<S>>,
}

impl<S> InlineDispatcher<S> {
    /// Wrap a shared sink.
    pub fn new(sink: Arc<Mutex<S>>) -> Self {
        Self { sink }
    }
}

impl<S: PublicationSink + Send> Dispatcher for InlineDispatcher<S> {
    fn dispatch(&self, op: PublicationOp) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        op.apply_to(&mut *sink);
    }
}

/// Inline dispatcher feeding a shared [`RecordingSink`].
pub fn recording_dispatcher() -> (InlineDispatcher<RecordingSink>, Arc<Mutex<RecordingSink>>) {
    let sink = Arc::new(Mutex::new(RecordingSink::new()));
    (InlineDispatcher::new(Arc::clone(&sink)), sink)
}

/// Copy of the events recorded by a shared sink.
pub fn events_of(sink: &Mutex<RecordingSink>) -> Vec<SinkEvent> {
    sink.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .events()
        .to_vec()
}
