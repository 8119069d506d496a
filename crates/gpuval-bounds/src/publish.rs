// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Publication of record inserts and count deltas to consumers.
//!
//! The engine never calls a [`PublicationSink`] directly. It wraps each
//! event as a [`PublicationOp`] and hands it to a [`Dispatcher`], which decides
//! where the sink runs. Dispatch order is publication order.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tracing::trace;

use crate::record::RecordRef;

/// Consumer of aggregate updates.
///
/// The ingestion thread bumps [`AggregateRecord::count`](crate::AggregateRecord::count)
/// when it flushes a batch, before the matching delta reaches the sink. A sink
/// that shows counts must build them from what it is delivered: start at zero
/// on insert, then take `total` (or add `delta`) on each count delta. Reading
/// `count()` through the record handle runs ahead of delivery.
pub trait PublicationSink {
    /// A record was created. Its delivered count starts at zero.
    fn publish_insert(&mut self, record: RecordRef);
    /// `delta` occurrences were added to a record, bringing it to `total`.
    fn publish_count_delta(&mut self, record: RecordRef, delta: u64, total: u64);
}

/// One publication event, ready to be applied to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationOp {
    /// See [`PublicationSink::publish_insert`].
    Insert(RecordRef),
    /// See [`PublicationSink::publish_count_delta`].
    CountDelta {
        /// Updated record.
        record: RecordRef,
        /// Occurrences added.
        delta: u64,
        /// Count right after this delta was applied.
        total: u64,
    },
}

impl PublicationOp {
    /// Record the event is about.
    pub fn record(&self) -> &RecordRef {
        match self {
            Self::Insert(record) | Self::CountDelta { record, .. } => record,
        }
    }

    /// Deliver to `sink`.
    pub fn apply_to<S: PublicationSink + ?Sized>(self, sink: &mut S) {
        match self {
            Self::Insert(record) => sink.publish_insert(record),
            Self::CountDelta {
                record,
                delta,
                total,
            } => sink.publish_count_delta(record, delta, total),
        }
    }
}

/// Schedules publication work on the consumer's execution context.
pub trait Dispatcher: Send {
    /// Schedule `op`. Must not block the caller on the consumer.
    fn dispatch(&self, op: PublicationOp);
}

/// Sending half of a publication queue.
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: Sender<PublicationOp>,
}

/// Receiving half of a publication queue, drained by the consumer's thread.
#[derive(Debug)]
pub struct DispatchQueue {
    rx: Receiver<PublicationOp>,
}

/// FIFO publication queue.
pub fn queue() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::channel();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, op: PublicationOp) {
        if self.tx.send(op).is_err() {
            trace!("publication queue closed; dropping op");
        }
    }
}

impl DispatchQueue {
    /// Apply up to `max` queued ops to `sink`. Returns how many were applied.
    pub fn run_pending<S: PublicationSink + ?Sized>(&self, sink: &mut S, max: usize) -> usize {
        let mut applied = 0;
        while applied < max {
            match self.rx.try_recv() {
                Ok(op) => {
                    op.apply_to(sink);
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Take up to `max` queued ops without applying them.
    pub fn drain(&self, max: usize) -> Vec<PublicationOp> {
        self.rx.try_iter().take(max).collect()
    }
}
