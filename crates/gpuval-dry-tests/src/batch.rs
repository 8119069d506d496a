// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire batch construction for tests.
//!
//! ```
//! use gpuval_dry_tests::BoundsBatchBuilder;
//!
//! let bytes = BoundsBatchBuilder::new()
//!     .texture_write(4)
//!     .texture_write_at(4, 7, (3, 4, 5))
//!     .build();
//! assert!(bytes.len() > 16);
//! ```

use gpuval_bounds::AggregateKey;
use gpuval_message_proto::{
    ChunkedMessage, ChunkedStreamWriter, Coordinate, DetailChunk, MessageId, MessageSchema,
    ResourceBoundsChunk, ResourceIndexOutOfBounds, ResourceToken, SchemaType, ShaderGuid,
    StreamHeader,
};

/// Message for `guid` with the given access class.
pub fn message(guid: u16, is_texture: bool, is_write: bool) -> ResourceIndexOutOfBounds {
    ResourceIndexOutOfBounds {
        shader_guid: ShaderGuid(guid),
        is_texture,
        is_write,
        reserved: 0,
    }
}

/// Key a texture write from `guid` aggregates under.
pub fn texture_write_key(guid: u16) -> AggregateKey {
    AggregateKey::derive(&message(guid, true, true))
}

/// Builder over [`ChunkedStreamWriter`] for resource bounds batches.
///
/// All methods take `self` by value and return `Self` for chaining.
#[derive(Debug, Default)]
pub struct BoundsBatchBuilder {
    writer: ChunkedStreamWriter<ResourceIndexOutOfBounds>,
}

impl BoundsBatchBuilder {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `msg` without chunks.
    #[allow(clippy::expect_used)]
    pub fn record(mut self, msg: ResourceIndexOutOfBounds) -> Self {
        self.writer.push(&msg, &[]).expect("record count overflow");
        self
    }

    /// Append `msg` with a detail chunk.
    #[allow(clippy::expect_used)]
    pub fn record_with_detail(
        mut self,
        msg: ResourceIndexOutOfBounds,
        token: u32,
        (x, y, z): (u32, u32, u32),
    ) -> Self {
        let detail = DetailChunk {
            token: ResourceToken(token),
            coordinate: Coordinate::new(x, y, z),
        };
        self.writer
            .push(&msg, &[(ResourceBoundsChunk::Detail, &detail.to_bytes())])
            .expect("detail chunk has the declared size");
        self
    }

    /// Append a texture write from `guid`.
    pub fn texture_write(self, guid: u16) -> Self {
        self.record(message(guid, true, true))
    }

    /// Append a texture write from `guid` with a detail chunk.
    pub fn texture_write_at(self, guid: u16, token: u32, coord: (u32, u32, u32)) -> Self {
        self.record_with_detail(message(guid, true, true), token, coord)
    }

    /// Records appended so far.
    pub fn len(&self) -> u32 {
        self.writer.len()
    }

    /// Whether no record was appended.
    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// Finished wire bytes.
    pub fn build(self) -> Vec<u8> {
        self.writer.finish()
    }
}

/// Header-only batch declaring a non-chunked schema for the resource bounds kind.
pub fn unchunked_batch(ty: SchemaType) -> Vec<u8> {
    batch_header(MessageSchema {
        ty,
        id: ResourceIndexOutOfBounds::ID,
    })
}

/// Header-only batch for an arbitrary schema.
pub fn batch_header(schema: MessageSchema) -> Vec<u8> {
    StreamHeader {
        schema,
        record_count: 0,
    }
    .to_bytes()
    .to_vec()
}

/// Message kind of resource bounds batches.
pub const BOUNDS_KIND: MessageId = ResourceIndexOutOfBounds::ID;
