// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire codec for diagnostic message streams emitted by instrumented GPU programs.
//!
//! A stream is a fixed header declaring the stream schema (static, dynamic or
//! chunked, plus the message kind) followed by `record_count` records. Chunked
//! records carry a per-record chunk mask; chunk bodies are only decoded when a
//! consumer asks for them.
//!
//! # Layers
//!
//! - [`stream`] - stream header, [`MessageSchema`] and the schema gate.
//! - [`chunked`] - the [`ChunkedMessage`] layout trait, lazy record views and
//!   the stream writer used by producers and tests.
//! - [`resource_bounds`] - the resource index out-of-bounds message.

use thiserror::Error;

pub mod chunked;
pub mod resource_bounds;
pub mod stream;

pub use chunked::{ChunkKind, ChunkMask, ChunkedMessage, ChunkedRecord, ChunkedStreamWriter, ChunkedView};
pub use resource_bounds::{
    Coordinate, DetailChunk, ResourceBoundsChunk, ResourceIndexOutOfBounds, ResourceToken,
    ShaderGuid,
};
pub use stream::{MessageId, MessageSchema, MessageStream, SchemaType, StreamHeader};

/// Stream decode/encode errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Input too short to contain the stream header.
    #[error("incomplete header: need {} bytes, got {0}", stream::STREAM_HEADER_SIZE)]
    IncompleteHeader(usize),

    /// Magic bytes do not match "GVMS".
    #[error("bad magic: expected GVMS, got {0:?}")]
    BadMagic([u8; 4]),

    /// Unsupported stream version.
    #[error("unsupported version: expected {}, got {0}", stream::STREAM_VERSION)]
    UnsupportedVersion(u16),

    /// Schema type discriminant is not known.
    #[error("unknown schema type {0}")]
    UnknownSchemaType(u16),

    /// Stream schema does not declare the requested chunked message kind.
    #[error("schema mismatch: expected chunked kind {expected:#x}, stream declares {found:?}")]
    SchemaMismatch {
        /// Message kind the view was opened for.
        expected: MessageId,
        /// Schema declared by the stream.
        found: MessageSchema,
    },

    /// A record is shorter than its declared layout.
    #[error("incomplete record {index}: need {needed} bytes, got {got}")]
    IncompleteRecord {
        /// Zero-based record index within the stream.
        index: u32,
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        got: usize,
    },

    /// Record carries a message id different from the stream schema.
    #[error("record {index} has message id {found:#x}, stream declares {expected:#x}")]
    MessageIdMismatch {
        /// Zero-based record index within the stream.
        index: u32,
        /// Message kind declared by the schema.
        expected: MessageId,
        /// Message id read from the record.
        found: MessageId,
    },

    /// Record chunk mask sets a bit the message kind does not define.
    #[error("record {index} declares unknown chunk mask bits {bits:#x}")]
    UnknownChunk {
        /// Zero-based record index within the stream.
        index: u32,
        /// Offending mask bits.
        bits: u32,
    },

    /// A chunk was accessed that the record does not carry.
    #[error("chunk {chunk} unavailable on record {index}")]
    ChunkUnavailable {
        /// Zero-based record index within the stream.
        index: u32,
        /// Chunk bit index.
        chunk: u32,
    },

    /// Encoded chunk body has the wrong size for its chunk kind.
    #[error("chunk {chunk} body is {got} bytes, layout requires {expected}")]
    ChunkSizeMismatch {
        /// Chunk bit index.
        chunk: u32,
        /// Size required by the layout.
        expected: usize,
        /// Size supplied.
        got: usize,
    },

    /// Body length disagrees with the declared record count.
    #[error("record count mismatch: header declares {declared}, {trailing} trailing bytes after last record")]
    TrailingBytes {
        /// Record count declared by the header.
        declared: u32,
        /// Bytes left over after decoding every declared record.
        trailing: usize,
    },

    /// Too many records for the 32-bit record count.
    #[error("record count overflow")]
    RecordCountOverflow,
}

/// Read a little-endian `u16` at `offset`; `None` when out of bounds.
#[inline]
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

/// Read a little-endian `u32` at `offset`; `None` when out of bounds.
#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
