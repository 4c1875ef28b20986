//! Error taxonomy for the wire codec.

use thiserror::Error;

/// Errors produced while encoding or decoding wire records.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WireError {
    /// The decoder needs more bytes than the caller provided. Retryable:
    /// refill the buffer and decode again.
    #[error("buffer too short: need {needed} bytes, have {available}")]
    ShortBuffer {
        /// Bytes required to decode the record.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The record starts with a tag no known operation uses. Fatal.
    #[error("record has unknown operation tag: {0}")]
    UnknownTag(u8),

    /// A block range spanning fewer than two blocks; single blocks have
    /// their own encoding. Fatal.
    #[error("block range must span at least two blocks")]
    EmptyBlockRange,

    /// A block range too long for its 32-bit count field.
    #[error("block range of {0} blocks does not fit the wire encoding")]
    RangeTooLong(u64),

    /// A data payload too long for its 32-bit length field; the producer
    /// must chunk it.
    #[error("data payload of {0} bytes exceeds the u32 wire limit")]
    DataTooLarge(usize),

    /// A hash payload too long for its 16-bit length field.
    #[error("hash payload of {0} bytes exceeds the u16 wire limit")]
    HashTooLarge(usize),
}

impl WireError {
    /// `true` when the caller can retry after providing more input.
    #[must_use]
    pub const fn is_short_buffer(&self) -> bool {
        matches!(self, WireError::ShortBuffer { .. })
    }
}
