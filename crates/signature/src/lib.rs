#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! crates/signature/src/lib.rs
//!
//! Target signature generation.
//!
//! The receiver walks its current content ("the target") in non-overlapping
//! blocks and publishes one [`BlockHash`] per block: the block's rolling weak
//! checksum plus a 64-bit strong hash. The sender later slides a window over
//! its content and uses the weak checksums to cheaply screen candidate
//! matches before confirming them with the strong hash.
//!
//! # Example
//!
//! ```
//! use signature::make_signature;
//! use std::io::Cursor;
//!
//! let target = Cursor::new(b"some target content".to_vec());
//! let entries: std::io::Result<Vec<_>> = make_signature(target, 8).collect();
//! let entries = entries.expect("in-memory reads cannot fail");
//! assert_eq!(entries.len(), 3);
//! assert_eq!(entries[2].index, 2);
//! ```

use std::io::{self, Read};

use checksums::{RollingChecksum, StrongHash, Xxh3};
use protocol::BlockHash;

/// Pull iterator yielding one [`BlockHash`] per non-overlapping target block.
///
/// Block indices are dense and start at zero. The final block may be shorter
/// than the block size; its hashes cover the short content as-is. A
/// zero-length target yields no entries.
pub struct SignatureIterator<R, H = Xxh3> {
    reader: R,
    buffer: Vec<u8>,
    hasher: H,
    rolling: RollingChecksum,
    index: u64,
    done: bool,
}

impl<R: Read> SignatureIterator<R> {
    /// Creates an iterator using the default XXH3 strong hash.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn new(reader: R, block_size: usize) -> Self {
        Self::with_hasher(reader, block_size)
    }
}

impl<R: Read, H: StrongHash> SignatureIterator<R, H> {
    /// Creates an iterator with a caller-chosen strong hash. The differ on
    /// the other side must be instantiated with the same choice.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_hasher(reader: R, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            reader,
            buffer: vec![0u8; block_size],
            hasher: H::default(),
            rolling: RollingChecksum::new(),
            index: 0,
            done: false,
        }
    }

    fn next_block(&mut self) -> io::Result<Option<BlockHash>> {
        let filled = read_full(&mut self.reader, &mut self.buffer)?;
        if filled == 0 {
            return Ok(None);
        }

        let block = &self.buffer[..filled];
        self.rolling.seed(block);
        let entry = BlockHash {
            index: self.index,
            weak: self.rolling.value(),
            strong: self.hasher.digest_block(block),
        };
        self.index += 1;
        Ok(Some(entry))
    }
}

impl<R: Read, H: StrongHash> Iterator for SignatureIterator<R, H> {
    type Item = io::Result<BlockHash>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_block() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Builds a signature iterator over `target`.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn make_signature<R: Read>(target: R, block_size: usize) -> SignatureIterator<R> {
    SignatureIterator::new(target, block_size)
}

/// Number of signature entries a target of `target_len` bytes produces.
#[must_use]
pub const fn block_hash_count(target_len: u64, block_size: usize) -> u64 {
    let block_size = block_size as u64;
    target_len / block_size + (target_len % block_size != 0) as u64
}

/// Reads until `buf` is full or the reader reaches end of input, retrying
/// interrupted reads. Returns the number of bytes placed in `buf`.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
