// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Resource bounds diagnostic aggregation.
//!
//! [`BoundsEngine`] consumes wire batches of `ResourceIndexOutOfBounds`
//! messages, collapses them into one [`AggregateRecord`] per
//! [`AggregateKey`], keeps a per-key index of unique faulting instances, and
//! publishes inserts and count deltas through an injected [`Dispatcher`].
//! New records are handed to a [`LocationResolver`] which may resolve them
//! later, from any thread.
//!
//! ```no_run
//! use gpuval_app_core::prefs::BoundsPrefs;
//! use gpuval_bounds::{publish, BoundsEngine};
//! use gpuval_message_proto::{ChunkedMessage, ResourceIndexOutOfBounds};
//!
//! # fn run(bytes: &[u8]) -> Result<(), gpuval_bounds::IngestError> {
//! let (dispatcher, queue) = publish::queue();
//! let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
//! engine.process_batch(bytes, ResourceIndexOutOfBounds::ID)?;
//! for op in queue.drain(64) {
//!     println!("{:?}", op.record().key());
//! }
//! # Ok(())
//! # }
//! ```

pub mod detail;
pub mod engine;
pub mod key;
pub mod publish;
pub mod record;
pub mod resolver;
pub mod shader;
pub mod table;

pub use detail::{DetailIndex, DetailRecord, InstanceInsert, ResourceDetail};
pub use engine::{BatchOutcome, BatchReport, BoundsEngine, IngestStats};
pub use key::AggregateKey;
pub use publish::{DispatchQueue, Dispatcher, PublicationOp, PublicationSink, QueueDispatcher};
pub use record::{AggregateRecord, AlreadyResolved, RecordRef, ShaderLocation};
pub use resolver::{LocationResolver, NoopResolver, PendingLocationMap};
pub use shader::{InMemoryShaderDirectory, ShaderDirectory, ShaderHandle};
pub use table::{AggregateTable, RecordSnapshot};

use gpuval_message_proto::WireError;
use thiserror::Error;

/// Batch-level ingestion failure. Nothing from the failing batch is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The batch bytes are not a well-formed stream.
    #[error("decode error: {0}")]
    Decode(#[from] WireError),
}
