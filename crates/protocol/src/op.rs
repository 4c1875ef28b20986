//! Delta operations and their wire codec.
//!
//! The encoding is little-endian with a one-byte tag:
//!
//! | tag    | variant      | layout                            | size       |
//! |--------|--------------|-----------------------------------|------------|
//! | `0x00` | `Block`      | tag, index (u64)                  | 9          |
//! | `0x01` | `Data`       | tag, length (u32), bytes          | 5 + length |
//! | `0x02` | `Hash`       | tag, length (u16), bytes          | 3 + length |
//! | `0x03` | `BlockRange` | tag, index (u64), count − 1 (u32) | 13         |

use crate::error::WireError;

const TAG_BLOCK: u8 = 0x00;
const TAG_DATA: u8 = 0x01;
const TAG_HASH: u8 = 0x02;
const TAG_BLOCK_RANGE: u8 = 0x03;

/// A single instruction in the delta stream.
///
/// `Data` and `Hash` payloads borrow from their producer: a differ hands out
/// slices of its internal buffer, a deserializer slices of the input record.
/// Callers wishing to retain a payload past the next pull must copy it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation<'a> {
    /// Copy block `index` of the target to the output.
    Block {
        /// Zero-based target block index.
        index: u64,
    },
    /// Copy blocks `index..=end` of the target to the output. Always spans
    /// at least two blocks; a single block is encoded as [`Operation::Block`].
    BlockRange {
        /// First target block index, inclusive.
        index: u64,
        /// Last target block index, inclusive; strictly greater than `index`.
        end: u64,
    },
    /// Append these literal bytes to the output.
    Data(&'a [u8]),
    /// Digest the preceding output must hash to; always the final operation
    /// of a delta.
    Hash(&'a [u8]),
}

impl<'a> Operation<'a> {
    /// Number of bytes [`serialize`](Self::serialize) produces for this
    /// operation.
    #[must_use]
    pub const fn serialized_len(&self) -> usize {
        match self {
            Operation::Block { .. } => 9,
            Operation::BlockRange { .. } => 13,
            Operation::Data(bytes) => 5 + bytes.len(),
            Operation::Hash(bytes) => 3 + bytes.len(),
        }
    }

    /// Appends the wire encoding of this operation to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::EmptyBlockRange`] for a range that does not span
    /// at least two blocks, [`WireError::RangeTooLong`] when the span does
    /// not fit the 32-bit count field, and
    /// [`WireError::DataTooLarge`]/[`WireError::HashTooLarge`] for payloads
    /// exceeding their length fields.
    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        match *self {
            Operation::Block { index } => {
                out.push(TAG_BLOCK);
                out.extend_from_slice(&index.to_le_bytes());
            }
            Operation::BlockRange { index, end } => {
                let count = end
                    .checked_sub(index)
                    .filter(|&count| count > 0)
                    .ok_or(WireError::EmptyBlockRange)?;
                let count =
                    u32::try_from(count).map_err(|_| WireError::RangeTooLong(count.saturating_add(1)))?;
                out.push(TAG_BLOCK_RANGE);
                out.extend_from_slice(&index.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
            }
            Operation::Data(bytes) => {
                let len =
                    u32::try_from(bytes.len()).map_err(|_| WireError::DataTooLarge(bytes.len()))?;
                out.push(TAG_DATA);
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(bytes);
            }
            Operation::Hash(bytes) => {
                let len =
                    u16::try_from(bytes.len()).map_err(|_| WireError::HashTooLarge(bytes.len()))?;
                out.push(TAG_HASH);
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
        Ok(())
    }

    /// Decodes one operation from the front of `data`, returning it together
    /// with the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::ShortBuffer`] when `data` holds less than one
    /// full record (refill and retry), [`WireError::UnknownTag`] for an
    /// unrecognized tag, and [`WireError::EmptyBlockRange`] for a range
    /// record whose count field is zero.
    pub fn deserialize(data: &'a [u8]) -> Result<(Operation<'a>, usize), WireError> {
        ensure(data, 1)?;
        match data[0] {
            TAG_BLOCK => {
                ensure(data, 9)?;
                let index = read_u64_le(&data[1..9]);
                Ok((Operation::Block { index }, 9))
            }
            TAG_BLOCK_RANGE => {
                ensure(data, 13)?;
                let index = read_u64_le(&data[1..9]);
                let count = read_u32_le(&data[9..13]);
                if count == 0 {
                    return Err(WireError::EmptyBlockRange);
                }
                let end = index
                    .checked_add(u64::from(count))
                    .ok_or(WireError::RangeTooLong(u64::from(count) + 1))?;
                Ok((Operation::BlockRange { index, end }, 13))
            }
            TAG_DATA => {
                ensure(data, 5)?;
                let len = read_u32_le(&data[1..5]) as usize;
                ensure(data, 5 + len)?;
                Ok((Operation::Data(&data[5..5 + len]), 5 + len))
            }
            TAG_HASH => {
                ensure(data, 3)?;
                let len = usize::from(read_u16_le(&data[1..3]));
                ensure(data, 3 + len)?;
                Ok((Operation::Hash(&data[3..3 + len]), 3 + len))
            }
            tag => Err(WireError::UnknownTag(tag)),
        }
    }
}

fn ensure(data: &[u8], needed: usize) -> Result<(), WireError> {
    if data.len() < needed {
        return Err(WireError::ShortBuffer {
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

pub(crate) fn read_u64_le(data: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[..8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn read_u32_le(data: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[..4]);
    u32::from_le_bytes(bytes)
}

fn read_u16_le(data: &[u8]) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&data[..2]);
    u16::from_le_bytes(bytes)
}
