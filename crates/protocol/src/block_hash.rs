//! Signature entries describing one target block.

use crate::error::WireError;
use crate::op::{read_u32_le, read_u64_le};

/// Number of bytes in a serialized [`BlockHash`].
pub const BLOCK_HASH_SIZE: usize = 20;

/// Signature entry for one target block.
///
/// Indices are dense and start at zero; the final block of a target may be
/// shorter than the block size, and its hashes are computed over the short
/// content as-is. The wire encoding is 20 bytes, all fields little-endian.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHash {
    /// Zero-based position of the block in the target.
    pub index: u64,
    /// Rolling weak checksum of the block content.
    pub weak: u32,
    /// 64-bit strong hash of the block content.
    pub strong: u64,
}

impl BlockHash {
    /// Returns the 20-byte wire encoding.
    #[must_use]
    pub fn serialize(&self) -> [u8; BLOCK_HASH_SIZE] {
        let mut out = [0u8; BLOCK_HASH_SIZE];
        out[..8].copy_from_slice(&self.index.to_le_bytes());
        out[8..12].copy_from_slice(&self.weak.to_le_bytes());
        out[12..].copy_from_slice(&self.strong.to_le_bytes());
        out
    }

    /// Decodes a record from the front of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::ShortBuffer`] when fewer than
    /// [`BLOCK_HASH_SIZE`] bytes are available.
    pub fn deserialize(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < BLOCK_HASH_SIZE {
            return Err(WireError::ShortBuffer {
                needed: BLOCK_HASH_SIZE,
                available: data.len(),
            });
        }
        Ok(Self {
            index: read_u64_le(&data[..8]),
            weak: read_u32_le(&data[8..12]),
            strong: read_u64_le(&data[12..20]),
        })
    }
}
