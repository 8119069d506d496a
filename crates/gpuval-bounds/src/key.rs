// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Aggregate key derivation and record descriptions.

use core::fmt;

use gpuval_message_proto::ResourceIndexOutOfBounds;

/// Deduplication identity of a diagnostic class.
///
/// Derived from the fixed fields only: shader guid, texture/buffer and
/// read/write. Reserved bits never contribute, so the same logical fault
/// always collapses onto the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregateKey(pub u32);

impl AggregateKey {
    /// Derive the key for a message.
    #[inline]
    pub const fn derive(message: &ResourceIndexOutOfBounds) -> Self {
        Self(message.key_bits())
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Human-readable description for the class `message` belongs to.
pub fn describe(message: &ResourceIndexOutOfBounds) -> String {
    let resource = if message.is_texture { "Texture" } else { "Buffer" };
    let access = if message.is_write { "write" } else { "read" };
    format!("{resource} {access} out of bounds")
}
