// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Message stream header and schema gate.
//!
//! Wire format (Little-Endian):
//! ```text
//! offset size  field
//! 0      4     magic = ASCII "GVMS"
//! 4      2     stream_version = u16 LE (1)
//! 6      2     schema_type = u16 LE (0 static, 1 dynamic, 2 chunked)
//! 8      4     schema_id = u32 LE (message kind)
//! 12     4     record_count = u32 LE
//!
//! 16     N     records
//! ```
//!
//! Chunk presence is declared once per stream through the schema, not per
//! message kind inside the records, so consumers must consult
//! [`MessageSchema::is_chunked`] before opening a chunked view.

use crate::{read_u16, read_u32, WireError};

/// Protocol magic constant "GVMS".
pub const STREAM_MAGIC: [u8; 4] = [b'G', b'V', b'M', b'S'];

/// Current stream version.
pub const STREAM_VERSION: u16 = 1;

/// Fixed header size in bytes (before records).
pub const STREAM_HEADER_SIZE: usize = 16;

/// Message kind identifier.
pub type MessageId = u32;

/// Layout class of the records in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SchemaType {
    /// Fixed-size records without chunks.
    Static = 0,
    /// Records with an inline variable-length tail.
    Dynamic = 1,
    /// Records with a chunk mask and optional chunk bodies.
    Chunked = 2,
}

impl SchemaType {
    /// Decode from the wire discriminant.
    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Static),
            1 => Some(Self::Dynamic),
            2 => Some(Self::Chunked),
            _ => None,
        }
    }
}

/// Stream schema: layout class plus the message kind carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSchema {
    /// Layout class.
    pub ty: SchemaType,
    /// Message kind.
    pub id: MessageId,
}

impl MessageSchema {
    /// Chunked schema for `id`.
    pub const fn chunked(id: MessageId) -> Self {
        Self {
            ty: SchemaType::Chunked,
            id,
        }
    }

    /// Schema gate: true when this stream carries chunked records of `kind`.
    #[inline]
    pub fn is_chunked(&self, kind: MessageId) -> bool {
        self.ty == SchemaType::Chunked && self.id == kind
    }
}

/// Stream header (fixed 16-byte prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Declared schema.
    pub schema: MessageSchema,
    /// Number of records following the header.
    pub record_count: u32,
}

impl StreamHeader {
    /// Encode header to a 16-byte array.
    pub fn to_bytes(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[0..4].copy_from_slice(&STREAM_MAGIC);
        buf[4..6].copy_from_slice(&STREAM_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&(self.schema.ty as u16).to_le_bytes());
        buf[8..12].copy_from_slice(&self.schema.id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.record_count.to_le_bytes());
        buf
    }

    /// Parse header from bytes. Returns error if invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < STREAM_HEADER_SIZE {
            return Err(WireError::IncompleteHeader(bytes.len()));
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != STREAM_MAGIC {
            return Err(WireError::BadMagic(magic));
        }

        let version = read_u16(bytes, 4).ok_or(WireError::IncompleteHeader(bytes.len()))?;
        if version != STREAM_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let raw_ty = read_u16(bytes, 6).ok_or(WireError::IncompleteHeader(bytes.len()))?;
        let ty = SchemaType::from_u16(raw_ty).ok_or(WireError::UnknownSchemaType(raw_ty))?;
        let id = read_u32(bytes, 8).ok_or(WireError::IncompleteHeader(bytes.len()))?;
        let record_count = read_u32(bytes, 12).ok_or(WireError::IncompleteHeader(bytes.len()))?;

        Ok(Self {
            schema: MessageSchema { ty, id },
            record_count,
        })
    }
}

/// A decoded stream: header plus borrowed record bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStream<'a> {
    header: StreamHeader,
    body: &'a [u8],
}

impl<'a> MessageStream<'a> {
    /// Decode the stream header; records stay undecoded.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, WireError> {
        let header = StreamHeader::from_bytes(bytes)?;
        Ok(Self {
            header,
            body: &bytes[STREAM_HEADER_SIZE..],
        })
    }

    /// Declared schema.
    pub fn schema(&self) -> MessageSchema {
        self.header.schema
    }

    /// Declared record count.
    pub fn count(&self) -> u32 {
        self.header.record_count
    }

    /// Raw record bytes.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Size of the record section in bytes.
    pub fn byte_size(&self) -> usize {
        self.body.len()
    }
}
