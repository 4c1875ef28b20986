//! crates/delta/src/apply.rs
//!
//! Delta application against a seekable target.

use std::io::{self, Read, Seek, SeekFrom, Write};

use checksums::{Checksummer, Xxh3_128};
use protocol::Operation;
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Errors surfaced while applying a delta.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Read, write, or seek failure from the target or the output.
    #[error("I/O failure while applying delta")]
    Io(#[from] io::Error),

    /// The reconstructed stream does not hash to the delta's trailing
    /// checksum: data was corrupted in transit or one of the files changed
    /// while the transfer was in progress.
    #[error("stream checksum mismatch (expected {expected:02x?}, computed {actual:02x?})")]
    ChecksumMismatch {
        /// Digest carried by the delta's hash operation.
        expected: Vec<u8>,
        /// Digest computed over the reconstructed output.
        actual: Vec<u8>,
    },
}

/// Replays a delta operation stream against a seekable target, writing the
/// reconstructed source to an output sink.
///
/// The patcher performs one seek and one block-sized read per referenced
/// block and feeds every written byte into a running checksummer. The final
/// [`Operation::Hash`] verifies that checksum; applying operations out of
/// their stream order voids the verification.
///
/// Must be instantiated with the `block_size` the signature was generated
/// with and the same checksummer as the differ.
pub struct Patcher<T, W, C = Xxh3_128> {
    target: T,
    output: W,
    checksummer: C,
    buffer: Vec<u8>,
    block_size: usize,
    bytes_written: u64,
}

impl<T: Read + Seek, W: Write> Patcher<T, W> {
    /// Creates a patcher using the default XXH3-128 stream checksum.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn new(target: T, output: W, block_size: usize) -> Self {
        Self::with_checksummer(target, output, block_size)
    }
}

impl<T: Read + Seek, W: Write, C: Checksummer> Patcher<T, W, C> {
    /// Creates a patcher with a caller-chosen stream checksum matching the
    /// differ's.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_checksummer(target: T, output: W, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            target,
            output,
            checksummer: C::default(),
            buffer: vec![0u8; block_size],
            block_size,
            bytes_written: 0,
        }
    }

    /// Total bytes written to the output so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Applies a single operation.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors immediately; partial output may have been
    /// written. A [`Operation::Hash`] whose payload disagrees with the
    /// running checksum fails with [`ApplyError::ChecksumMismatch`].
    pub fn apply(&mut self, op: &Operation<'_>) -> Result<(), ApplyError> {
        match *op {
            Operation::Block { index } => {
                self.copy_block(index)?;
            }
            Operation::BlockRange { index, end } => {
                for block in index..=end {
                    // A range running past the end of the target stops
                    // silently once a block reads back empty.
                    if self.copy_block(block)? == 0 {
                        break;
                    }
                }
            }
            Operation::Data(bytes) => {
                self.checksummer.update(bytes);
                self.output.write_all(bytes)?;
                self.bytes_written += bytes.len() as u64;
            }
            Operation::Hash(expected) => {
                let actual = self.checksummer.digest();
                if actual.as_ref() != expected {
                    return Err(ApplyError::ChecksumMismatch {
                        expected: expected.to_vec(),
                        actual: actual.as_ref().to_vec(),
                    });
                }
                #[cfg(feature = "tracing")]
                debug!(bytes_written = self.bytes_written, "stream checksum verified");
            }
        }
        Ok(())
    }

    /// Copies one target block to the output, returning the bytes copied.
    ///
    /// The block is read until full or until target EOF, so a short block can
    /// only be the target's final one.
    fn copy_block(&mut self, index: u64) -> Result<usize, ApplyError> {
        let offset = index
            .checked_mul(self.block_size as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "block offset overflow"))?;
        self.target.seek(SeekFrom::Start(offset))?;

        let filled = read_full(&mut self.target, &mut self.buffer)?;
        let block = &self.buffer[..filled];
        self.checksummer.update(block);
        self.output.write_all(block)?;
        self.bytes_written += filled as u64;
        Ok(filled)
    }
}

/// Applies a full operation stream with the default checksummer, returning
/// the number of bytes written.
///
/// # Errors
///
/// See [`Patcher::apply`].
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "apply_delta"))]
pub fn apply_delta<'a, T, W, I>(
    target: T,
    output: W,
    block_size: usize,
    ops: I,
) -> Result<u64, ApplyError>
where
    T: Read + Seek,
    W: Write,
    I: IntoIterator<Item = Operation<'a>>,
{
    let mut patcher: Patcher<T, W> = Patcher::new(target, output, block_size);
    for op in ops {
        patcher.apply(&op)?;
    }
    Ok(patcher.bytes_written())
}

/// Reads until `buf` is full or the reader reaches end of input, retrying
/// interrupted reads.
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
