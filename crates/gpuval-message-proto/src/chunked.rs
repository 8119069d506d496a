// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Chunked record layout, lazy record views and the stream writer.
//!
//! Record format (Little-Endian):
//! ```text
//! offset size  field
//! 0      4     message_id = u32 LE (must equal the stream schema id)
//! 4      4     chunk_mask = u32 LE (bit i set => chunk i follows)
//! 8      F     fixed fields (F = M::FIXED_SIZE)
//! 8+F    ...   chunk bodies in ascending bit order
//! ```
//!
//! Chunk bodies have a fixed size per chunk kind, so the record length is
//! known from the mask alone. Bodies are only sliced out when a consumer asks
//! for them through [`ChunkedRecord::chunk_bytes`].

use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::stream::{MessageId, MessageSchema, MessageStream, StreamHeader};
use crate::{read_u32, WireError};

/// Size of the per-record prefix (message id + chunk mask).
pub const RECORD_HEADER_SIZE: usize = 8;

/// Optional chunk kind of a chunked message.
pub trait ChunkKind: Copy + Eq + fmt::Debug {
    /// Bit index of this chunk in the record chunk mask.
    fn bit(self) -> u32;
}

/// Static layout of a chunked message kind.
pub trait ChunkedMessage: Sized {
    /// Message kind identifier.
    const ID: MessageId;
    /// Size of the always-present fixed fields.
    const FIXED_SIZE: usize;
    /// Body size of each chunk, indexed by chunk bit.
    const CHUNK_SIZES: &'static [usize];

    /// Chunk kinds of this message.
    type Chunk: ChunkKind;

    /// Decode the fixed fields. `fixed` is exactly [`Self::FIXED_SIZE`] bytes.
    fn decode_fixed(fixed: &[u8]) -> Self;

    /// Append the fixed fields to `out`.
    fn encode_fixed(&self, out: &mut Vec<u8>);
}

/// Per-record chunk presence mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChunkMask(pub u32);

impl ChunkMask {
    /// Mask with every chunk bit defined by `M`.
    pub fn known<M: ChunkedMessage>() -> Self {
        let n = M::CHUNK_SIZES.len();
        if n >= 32 {
            Self(u32::MAX)
        } else {
            Self((1u32 << n) - 1)
        }
    }

    /// Whether `bit` is set.
    #[inline]
    pub const fn contains(self, bit: u32) -> bool {
        match 1u32.checked_shl(bit) {
            Some(flag) => self.0 & flag != 0,
            None => false,
        }
    }

    /// Copy of this mask with `bit` set. Bits past 31 are ignored.
    #[inline]
    pub const fn with(self, bit: u32) -> Self {
        match 1u32.checked_shl(bit) {
            Some(flag) => Self(self.0 | flag),
            None => self,
        }
    }

    /// Total chunk body size for this mask. Assumes the mask has no unknown bits.
    fn body_size<M: ChunkedMessage>(self) -> usize {
        M::CHUNK_SIZES
            .iter()
            .enumerate()
            .filter(|(bit, _)| u32::try_from(*bit).is_ok_and(|b| self.contains(b)))
            .map(|(_, size)| *size)
            .sum()
    }
}

/// One chunked record borrowed from a stream.
///
/// Fixed fields decode through [`message`](Self::message); chunk bodies are
/// decoded on access.
pub struct ChunkedRecord<'a, M> {
    index: u32,
    mask: ChunkMask,
    fixed: &'a [u8],
    chunks: &'a [u8],
    _marker: PhantomData<fn() -> M>,
}

impl<M> Clone for ChunkedRecord<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for ChunkedRecord<'_, M> {}

impl<M> fmt::Debug for ChunkedRecord<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedRecord")
            .field("index", &self.index)
            .field("mask", &self.mask)
            .field("fixed_len", &self.fixed.len())
            .field("chunks_len", &self.chunks.len())
            .finish()
    }
}

impl<'a, M: ChunkedMessage> ChunkedRecord<'a, M> {
    /// Zero-based position of the record within its stream.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Chunk presence mask.
    pub fn mask(&self) -> ChunkMask {
        self.mask
    }

    /// Decode the fixed fields.
    pub fn message(&self) -> M {
        M::decode_fixed(self.fixed)
    }

    /// Whether the record carries `chunk`.
    pub fn has_chunk(&self, chunk: M::Chunk) -> bool {
        self.mask.contains(chunk.bit())
    }

    /// Borrow the body of `chunk`.
    ///
    /// Fails with [`WireError::ChunkUnavailable`] when the record does not
    /// carry the chunk; the body is never zero-filled.
    pub fn chunk_bytes(&self, chunk: M::Chunk) -> Result<&'a [u8], WireError> {
        let bit = chunk.bit();
        let unavailable = WireError::ChunkUnavailable {
            index: self.index,
            chunk: bit,
        };
        if !self.mask.contains(bit) {
            return Err(unavailable);
        }
        let size = usize::try_from(bit)
            .ok()
            .and_then(|b| M::CHUNK_SIZES.get(b).copied())
            .ok_or(unavailable)?;

        let offset: usize = M::CHUNK_SIZES
            .iter()
            .enumerate()
            .take_while(|(b, _)| u32::try_from(*b).is_ok_and(|b| b < bit))
            .filter(|(b, _)| u32::try_from(*b).is_ok_and(|b| self.mask.contains(b)))
            .map(|(_, s)| *s)
            .sum();

        self.chunks
            .get(offset..offset + size)
            .ok_or(WireError::IncompleteRecord {
                index: self.index,
                needed: offset + size,
                got: self.chunks.len(),
            })
    }
}

/// Chunked view over a stream whose schema declares `M`.
#[derive(Debug)]
pub struct ChunkedView<'a, M> {
    body: &'a [u8],
    count: u32,
    _marker: PhantomData<fn() -> M>,
}

impl<'a, M: ChunkedMessage> ChunkedView<'a, M> {
    /// Open a view; fails unless the stream schema is chunked for `M::ID`.
    pub fn new(stream: &MessageStream<'a>) -> Result<Self, WireError> {
        let schema = stream.schema();
        if !schema.is_chunked(M::ID) {
            return Err(WireError::SchemaMismatch {
                expected: M::ID,
                found: schema,
            });
        }
        Ok(Self {
            body: stream.body(),
            count: stream.count(),
            _marker: PhantomData,
        })
    }

    /// Declared record count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Walk every record, checking structural bounds, before anything is consumed.
    pub fn validate(self) -> Result<Vec<ChunkedRecord<'a, M>>, WireError> {
        self.into_iter().collect()
    }
}

impl<'a, M: ChunkedMessage> IntoIterator for ChunkedView<'a, M> {
    type Item = Result<ChunkedRecord<'a, M>, WireError>;
    type IntoIter = ChunkedRecords<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        ChunkedRecords {
            body: self.body,
            offset: 0,
            index: 0,
            count: self.count,
            done: false,
            _marker: PhantomData,
        }
    }
}

/// Lazy, non-restartable record iterator. Fuses after the first error.
#[derive(Debug)]
pub struct ChunkedRecords<'a, M> {
    body: &'a [u8],
    offset: usize,
    index: u32,
    count: u32,
    done: bool,
    _marker: PhantomData<fn() -> M>,
}

impl<'a, M: ChunkedMessage> ChunkedRecords<'a, M> {
    fn decode_next(&mut self) -> Result<ChunkedRecord<'a, M>, WireError> {
        let index = self.index;
        let body: &'a [u8] = self.body;
        let rest = body.get(self.offset..).unwrap_or_default();

        let prefix = RECORD_HEADER_SIZE + M::FIXED_SIZE;
        let incomplete = |needed: usize| WireError::IncompleteRecord {
            index,
            needed,
            got: rest.len(),
        };
        if rest.len() < prefix {
            return Err(incomplete(prefix));
        }

        let id = read_u32(rest, 0).ok_or_else(|| incomplete(prefix))?;
        if id != M::ID {
            return Err(WireError::MessageIdMismatch {
                index,
                expected: M::ID,
                found: id,
            });
        }

        let mask = ChunkMask(read_u32(rest, 4).ok_or_else(|| incomplete(prefix))?);
        let unknown = mask.0 & !ChunkMask::known::<M>().0;
        if unknown != 0 {
            return Err(WireError::UnknownChunk {
                index,
                bits: unknown,
            });
        }

        let needed = prefix + mask.body_size::<M>();
        if rest.len() < needed {
            return Err(incomplete(needed));
        }

        self.offset += needed;
        Ok(ChunkedRecord {
            index,
            mask,
            fixed: &rest[RECORD_HEADER_SIZE..prefix],
            chunks: &rest[prefix..needed],
            _marker: PhantomData,
        })
    }
}

impl<'a, M: ChunkedMessage> Iterator for ChunkedRecords<'a, M> {
    type Item = Result<ChunkedRecord<'a, M>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.index == self.count {
            self.done = true;
            let trailing = self.body.len().saturating_sub(self.offset);
            if trailing != 0 {
                return Some(Err(WireError::TrailingBytes {
                    declared: self.count,
                    trailing,
                }));
            }
            return None;
        }
        match self.decode_next() {
            Ok(record) => {
                self.index += 1;
                Some(Ok(record))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<M: ChunkedMessage> FusedIterator for ChunkedRecords<'_, M> {}

/// Builds a chunked stream for message kind `M`.
#[derive(Debug)]
pub struct ChunkedStreamWriter<M> {
    body: Vec<u8>,
    count: u32,
    _marker: PhantomData<fn() -> M>,
}

impl<M: ChunkedMessage> Default for ChunkedStreamWriter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ChunkedMessage> ChunkedStreamWriter<M> {
    /// Empty writer.
    pub fn new() -> Self {
        Self {
            body: Vec::new(),
            count: 0,
            _marker: PhantomData,
        }
    }

    /// Number of records written so far.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether no record has been written.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append one record with the given chunk bodies.
    ///
    /// Bodies may be passed in any order; they are written in bit order. When
    /// the same chunk appears twice the first body wins.
    pub fn push(&mut self, message: &M, chunks: &[(M::Chunk, &[u8])]) -> Result<(), WireError> {
        let count = self
            .count
            .checked_add(1)
            .ok_or(WireError::RecordCountOverflow)?;

        let mut ordered: Vec<(u32, &[u8])> = Vec::with_capacity(chunks.len());
        for (chunk, bytes) in chunks {
            let bit = chunk.bit();
            let expected = usize::try_from(bit)
                .ok()
                .and_then(|b| M::CHUNK_SIZES.get(b).copied())
                .ok_or(WireError::UnknownChunk {
                    index: self.count,
                    bits: 1u32.checked_shl(bit).unwrap_or(0),
                })?;
            if bytes.len() != expected {
                return Err(WireError::ChunkSizeMismatch {
                    chunk: bit,
                    expected,
                    got: bytes.len(),
                });
            }
            ordered.push((bit, bytes));
        }
        ordered.sort_by_key(|(bit, _)| *bit);
        ordered.dedup_by_key(|(bit, _)| *bit);

        let mask = ordered
            .iter()
            .fold(ChunkMask::default(), |mask, (bit, _)| mask.with(*bit));

        self.body.extend_from_slice(&M::ID.to_le_bytes());
        self.body.extend_from_slice(&mask.0.to_le_bytes());
        message.encode_fixed(&mut self.body);
        for (_, bytes) in ordered {
            self.body.extend_from_slice(bytes);
        }
        self.count = count;
        Ok(())
    }

    /// Finish the stream: header followed by every record.
    pub fn finish(self) -> Vec<u8> {
        let header = StreamHeader {
            schema: MessageSchema::chunked(M::ID),
            record_count: self.count,
        };
        let header_bytes = header.to_bytes();
        let mut out = Vec::with_capacity(header_bytes.len() + self.body.len());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&self.body);
        out
    }
}
