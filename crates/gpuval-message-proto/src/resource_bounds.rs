// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Resource index out-of-bounds message.
//!
//! Fixed fields (4 bytes, Little-Endian `u32` word):
//! ```text
//! bits  0..16  shader_guid
//! bit   16     is_texture
//! bit   17     is_write
//! bits 18..32  reserved (passed through)
//! ```
//!
//! Chunk 0, `detail` (16 bytes): `token u32`, `x u32`, `y u32`, `z u32`.

use core::fmt;

use crate::chunked::{ChunkKind, ChunkedMessage, ChunkedRecord};
use crate::stream::MessageId;
use crate::{read_u32, WireError};

/// Shader identity the instrumentation attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderGuid(pub u16);

/// Opaque resource identity carried by a detail chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceToken(pub u32);

/// Three-component resource index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Coordinate {
    /// X component.
    pub x: u32,
    /// Y component.
    pub y: u32,
    /// Z component.
    pub z: u32,
}

impl Coordinate {
    /// Construct from components.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// Chunks of [`ResourceIndexOutOfBounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBoundsChunk {
    /// Resource token and faulting coordinate.
    Detail,
}

impl ChunkKind for ResourceBoundsChunk {
    fn bit(self) -> u32 {
        match self {
            Self::Detail => 0,
        }
    }
}

/// Resource index out-of-bounds access reported by instrumented shader code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceIndexOutOfBounds {
    /// Shader the faulting instruction belongs to.
    pub shader_guid: ShaderGuid,
    /// Texture access (buffer otherwise).
    pub is_texture: bool,
    /// Write access (read otherwise).
    pub is_write: bool,
    /// Reserved high bits, carried through untouched.
    pub reserved: u16,
}

impl ResourceIndexOutOfBounds {
    const TEXTURE_BIT: u32 = 1 << 16;
    const WRITE_BIT: u32 = 1 << 17;
    const RESERVED_SHIFT: u32 = 18;

    /// Pack the fixed fields into their wire word.
    // u16 -> u32 widening; `u32::from` is not const.
    #[allow(clippy::cast_lossless)]
    pub const fn to_word(&self) -> u32 {
        let mut word = self.shader_guid.0 as u32;
        if self.is_texture {
            word |= Self::TEXTURE_BIT;
        }
        if self.is_write {
            word |= Self::WRITE_BIT;
        }
        word | ((self.reserved as u32) << Self::RESERVED_SHIFT)
    }

    /// Unpack the fixed fields from their wire word.
    // Both casts are masked or shifted to at most 16 bits first.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_word(word: u32) -> Self {
        Self {
            shader_guid: ShaderGuid((word & 0xFFFF) as u16),
            is_texture: word & Self::TEXTURE_BIT != 0,
            is_write: word & Self::WRITE_BIT != 0,
            reserved: (word >> Self::RESERVED_SHIFT) as u16,
        }
    }

    /// Bits of the fixed word that identify the access class (guid + kind flags).
    pub const fn key_bits(&self) -> u32 {
        self.to_word() & (0xFFFF | Self::TEXTURE_BIT | Self::WRITE_BIT)
    }
}

impl ChunkedMessage for ResourceIndexOutOfBounds {
    const ID: MessageId = 0x0000_0101;
    const FIXED_SIZE: usize = 4;
    const CHUNK_SIZES: &'static [usize] = &[DetailChunk::SIZE];
    type Chunk = ResourceBoundsChunk;

    fn decode_fixed(fixed: &[u8]) -> Self {
        Self::from_word(read_u32(fixed, 0).unwrap_or_default())
    }

    fn encode_fixed(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_word().to_le_bytes());
    }
}

/// Detail chunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetailChunk {
    /// Resource the access targeted.
    pub token: ResourceToken,
    /// Faulting coordinate.
    pub coordinate: Coordinate,
}

impl DetailChunk {
    /// Encoded size in bytes.
    pub const SIZE: usize = 16;

    /// Encode to the 16-byte chunk body.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.token.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.coordinate.x.to_le_bytes());
        buf[8..12].copy_from_slice(&self.coordinate.y.to_le_bytes());
        buf[12..16].copy_from_slice(&self.coordinate.z.to_le_bytes());
        buf
    }

    /// Decode from a chunk body. `None` when shorter than [`Self::SIZE`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            token: ResourceToken(read_u32(bytes, 0)?),
            coordinate: Coordinate {
                x: read_u32(bytes, 4)?,
                y: read_u32(bytes, 8)?,
                z: read_u32(bytes, 12)?,
            },
        })
    }
}

impl ChunkedRecord<'_, ResourceIndexOutOfBounds> {
    /// Decode the detail chunk.
    ///
    /// Fails with [`WireError::ChunkUnavailable`] when the record has none.
    pub fn detail_chunk(&self) -> Result<DetailChunk, WireError> {
        let body = self.chunk_bytes(ResourceBoundsChunk::Detail)?;
        DetailChunk::from_bytes(body).ok_or(WireError::IncompleteRecord {
            index: self.index(),
            needed: DetailChunk::SIZE,
            got: body.len(),
        })
    }
}
