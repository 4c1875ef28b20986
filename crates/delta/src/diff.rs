//! crates/delta/src/diff.rs
//!
//! Single-pass differ: finds target blocks inside the source while streaming.
//!
//! The differ slides a block-sized window over the source
//! (<https://rsync.samba.org/tech_report/node4.html>). At each position the
//! rolling checksum screens the signature index; a weak hit is confirmed with
//! the strong hash. Matches become block references, the bytes the window
//! slid past become literal data, and consecutive block references coalesce
//! into ranges. The trailing operation carries the strong checksum of the
//! entire source so the receiver can verify the reconstruction.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::mem;

use checksums::{Checksummer, RollingChecksum, StrongHash, Xxh3, Xxh3_128};
use protocol::{BlockHash, Operation};

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::index::SignatureIndex;

/// Ring buffer capacity in units of the block size. Any multiple of at least
/// two works; a larger buffer amortizes the wrap-around copy.
const BUFFER_BLOCKS: usize = 8;

/// Longest literal payload a single operation can carry on the wire.
const MAX_DATA_LEN: usize = u32::MAX as usize;

/// Cursor into the ring buffer.
#[derive(Clone, Copy, Debug, Default)]
struct Span {
    pos: usize,
    len: usize,
}

/// Block copy waiting for a chance to coalesce with its successor.
#[derive(Clone, Copy, Debug)]
struct PendingCopy {
    first: u64,
    last: u64,
}

impl PendingCopy {
    fn into_op(self) -> Operation<'static> {
        if self.first == self.last {
            Operation::Block { index: self.first }
        } else {
            Operation::BlockRange {
                index: self.first,
                end: self.last,
            }
        }
    }
}

/// Operation queued for the caller. Literal payloads stay as spans into the
/// ring buffer; only literals parked across a buffer wrap are owned.
enum Queued {
    Copy(PendingCopy),
    DataSpan { pos: usize, len: usize },
    DataOwned(Vec<u8>),
    Hash(Vec<u8>),
}

/// Counters describing the delta produced so far.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeltaStats {
    /// Bytes emitted as literal data.
    pub literal_bytes: u64,
    /// Target blocks referenced by block and range operations.
    pub matched_blocks: u64,
}

/// Single-pass differ producing the operations that rebuild a source stream
/// from a target's blocks plus literal data.
///
/// Operations are pulled one at a time with [`next_op`](Self::next_op); a
/// [`Operation::Data`] payload borrows the internal buffer and is only valid
/// until the next pull. The differ owns one contiguous buffer of eight block
/// sizes and performs no I/O beyond sequential reads of the source.
///
/// The signature must have been generated with the same `block_size` and the
/// same strong hash; the stream checksummer must match the patcher's.
pub struct Differ<R, H = Xxh3, C = Xxh3_128> {
    source: R,
    buffer: Vec<u8>,
    /// Bytes of `buffer` holding source data.
    filled: usize,
    index: SignatureIndex,
    hasher: H,
    checksummer: C,
    rolling: RollingChecksum,
    window: Span,
    /// Literal bytes accumulated behind the window;
    /// `data.pos + data.len == window.pos` at all times.
    data: Span,
    /// Literal bytes parked when a buffer wrap evicted them; they prefix the
    /// next literal operation so adjacent literals stay merged.
    literal_carry: Vec<u8>,
    block_size: usize,
    finished: bool,
    pending: Option<PendingCopy>,
    ready: VecDeque<Queued>,
    /// Holds the payload of the most recently returned owned operation.
    scratch: Vec<u8>,
    stats: DeltaStats,
}

impl<R: Read> Differ<R> {
    /// Creates a differ using the default XXH3 hashes.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn new(
        source: R,
        signature: impl IntoIterator<Item = BlockHash>,
        block_size: usize,
    ) -> Self {
        Self::with_hashers(source, signature, block_size)
    }
}

impl<R: Read, H: StrongHash, C: Checksummer> Differ<R, H, C> {
    /// Creates a differ with caller-chosen hash algorithms. Both transfer
    /// peers must make the same choices.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_hashers(
        source: R,
        signature: impl IntoIterator<Item = BlockHash>,
        block_size: usize,
    ) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            source,
            buffer: vec![0u8; BUFFER_BLOCKS * block_size],
            filled: 0,
            index: SignatureIndex::new(signature),
            hasher: H::default(),
            checksummer: C::default(),
            rolling: RollingChecksum::new(),
            window: Span::default(),
            data: Span::default(),
            literal_carry: Vec::new(),
            block_size,
            finished: false,
            pending: None,
            ready: VecDeque::new(),
            scratch: Vec::new(),
            stats: DeltaStats::default(),
        }
    }

    /// Counters for the delta produced so far.
    #[must_use]
    pub const fn stats(&self) -> DeltaStats {
        self.stats
    }

    /// Returns the next operation, or `None` once the delta is complete.
    ///
    /// A returned [`Operation::Data`] payload may borrow the internal buffer
    /// and must be consumed (or copied) before the next pull.
    ///
    /// # Errors
    ///
    /// Surfaces any I/O error from the source reader verbatim. Reaching the
    /// end of the source is normal termination, not an error.
    pub fn next_op(&mut self) -> io::Result<Option<Operation<'_>>> {
        while self.ready.is_empty() && !self.finished {
            self.step()?;
        }

        let Some(queued) = self.ready.pop_front() else {
            return Ok(None);
        };
        let op = match queued {
            Queued::Copy(copy) => copy.into_op(),
            Queued::DataSpan { pos, len } => Operation::Data(&self.buffer[pos..pos + len]),
            Queued::DataOwned(bytes) => {
                self.scratch = bytes;
                Operation::Data(&self.scratch)
            }
            Queued::Hash(bytes) => {
                self.scratch = bytes;
                Operation::Hash(&self.scratch)
            }
        };
        Ok(Some(op))
    }

    /// Advances the window by one position: extend or seed, probe, and on a
    /// match retire the window.
    fn step(&mut self) -> io::Result<()> {
        if self.window.len > 0 {
            // Slide by one byte; the outgoing byte joins the literal run.
            if !self.ensure_filled(self.window.pos + self.window.len)? {
                self.finish_up();
                return Ok(());
            }
            self.window.pos += 1;
            self.data.len += 1;
            self.rolling.roll(
                self.buffer[self.window.pos],
                self.buffer[self.window.pos + self.window.len - 1],
            );
        } else {
            // Seed a fresh window after a match or at start of stream.
            if !self.ensure_filled(self.window.pos + self.block_size - 1)? {
                self.finish_up();
                return Ok(());
            }
            self.window.len = self.block_size;
            self.rolling
                .seed(&self.buffer[self.window.pos..self.window.pos + self.window.len]);
        }

        if let Some(matched) = self.probe() {
            self.flush_literal();
            self.push_copy(matched);
            self.window.pos += self.window.len;
            self.window.len = 0;
            self.data.pos = self.window.pos;
            debug_assert_eq!(self.data.len, 0);
        }
        Ok(())
    }

    /// Confirms a weak hit on the current window with the strong hash; the
    /// first strong match in the bucket wins.
    fn probe(&mut self) -> Option<u64> {
        let Self {
            index,
            hasher,
            buffer,
            window,
            rolling,
            ..
        } = self;
        let bucket = index.get(rolling.value())?;
        let strong = hasher.digest_block(&buffer[window.pos..window.pos + window.len]);
        bucket
            .iter()
            .find(|entry| entry.strong == strong)
            .map(|entry| entry.index)
    }

    /// Probes the undispatched tail at its actual length, letting a trailing
    /// short target block match even though it never fills a window.
    fn probe_tail(&mut self, tail_len: usize) -> Option<u64> {
        let Self {
            index,
            hasher,
            buffer,
            window,
            ..
        } = self;
        let tail = &buffer[window.pos..window.pos + tail_len];
        let bucket = index.get(RollingChecksum::digest(tail))?;
        let strong = hasher.digest_block(tail);
        bucket
            .iter()
            .find(|entry| entry.strong == strong)
            .map(|entry| entry.index)
    }

    /// Makes the byte at buffer offset `idx` available, reading from the
    /// source and wrapping the buffer as needed. Returns `false` when the
    /// source ends first.
    fn ensure_filled(&mut self, mut idx: usize) -> io::Result<bool> {
        if idx < self.filled {
            return Ok(true);
        }

        if idx >= self.buffer.len() {
            // Wrap: park the pending literal bytes, then move the active
            // region [window.pos, filled) down to the start of the buffer.
            if self.data.len > 0 {
                self.literal_carry
                    .extend_from_slice(&self.buffer[self.data.pos..self.data.pos + self.data.len]);
                self.data.len = 0;
            }
            idx -= self.window.pos;
            self.buffer.copy_within(self.window.pos..self.filled, 0);
            self.filled -= self.window.pos;
            self.window.pos = 0;
            self.data.pos = 0;
        }

        while self.filled <= idx {
            let read = match self.source.read(&mut self.buffer[self.filled..]) {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if read == 0 {
                return Ok(false);
            }
            // Every byte consumed from the source feeds the stream checksum,
            // whether it ends up in a literal or a block match.
            self.checksummer
                .update(&self.buffer[self.filled..self.filled + read]);
            self.filled += read;
        }
        Ok(true)
    }

    /// Queues the accumulated literal bytes, merging in any bytes parked by a
    /// buffer wrap so adjacent literals become a single operation.
    fn flush_literal(&mut self) {
        let total = self.literal_carry.len() + self.data.len;
        if total == 0 {
            return;
        }
        self.flush_pending();

        if self.literal_carry.is_empty() && self.data.len <= MAX_DATA_LEN {
            self.ready.push_back(Queued::DataSpan {
                pos: self.data.pos,
                len: self.data.len,
            });
        } else {
            let mut bytes = mem::take(&mut self.literal_carry);
            bytes.extend_from_slice(&self.buffer[self.data.pos..self.data.pos + self.data.len]);
            // A literal run past the 32-bit wire limit must be chunked.
            while bytes.len() > MAX_DATA_LEN {
                let rest = bytes.split_off(MAX_DATA_LEN);
                self.ready.push_back(Queued::DataOwned(bytes));
                bytes = rest;
            }
            self.ready.push_back(Queued::DataOwned(bytes));
        }

        self.stats.literal_bytes += total as u64;
        self.data.pos += self.data.len;
        self.data.len = 0;
    }

    /// Records a matched block, coalescing consecutive indices into ranges.
    fn push_copy(&mut self, index: u64) {
        self.stats.matched_blocks += 1;
        if let Some(pending) = &mut self.pending {
            if pending.last + 1 == index {
                pending.last = index;
                return;
            }
        }
        self.flush_pending();
        self.pending = Some(PendingCopy {
            first: index,
            last: index,
        });
    }

    fn flush_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.ready.push_back(Queued::Copy(pending));
        }
    }

    /// Drains everything the window could not match — trailing literals and
    /// the coalescer slot — then seals the delta with the stream checksum.
    fn finish_up(&mut self) {
        let tail_len = self.filled - self.window.pos;
        if tail_len > 0 {
            if let Some(matched) = self.probe_tail(tail_len) {
                self.flush_literal();
                self.push_copy(matched);
            } else {
                // The tail joins the pending literal run as one operation.
                self.data.len = self.filled - self.data.pos;
                self.flush_literal();
            }
        } else {
            self.flush_literal();
        }
        self.flush_pending();
        self.ready
            .push_back(Queued::Hash(self.checksummer.digest().as_ref().to_vec()));

        #[cfg(feature = "tracing")]
        debug!(
            literal_bytes = self.stats.literal_bytes,
            matched_blocks = self.stats.matched_blocks,
            "delta complete"
        );
        self.finished = true;
    }
}

/// Runs `differ` to completion, handing each operation to `sink`.
///
/// Returns the delta counters once the trailing hash operation has been
/// delivered.
///
/// # Errors
///
/// Propagates I/O errors from the source and whatever error type the sink
/// reports.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "generate_delta"))]
pub fn generate_delta<R, H, C, F, E>(differ: &mut Differ<R, H, C>, mut sink: F) -> Result<DeltaStats, E>
where
    R: Read,
    H: StrongHash,
    C: Checksummer,
    F: FnMut(Operation<'_>) -> Result<(), E>,
    E: From<io::Error>,
{
    while let Some(op) = differ.next_op()? {
        sink(op)?;
    }
    Ok(differ.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn signature_of(target: &[u8], block_size: usize) -> Vec<BlockHash> {
        signature::make_signature(Cursor::new(target.to_vec()), block_size)
            .collect::<io::Result<Vec<_>>>()
            .expect("in-memory reads cannot fail")
    }

    /// Owned mirror of [`Operation`] so tests can collect whole deltas.
    #[derive(Debug, PartialEq, Eq)]
    enum Op {
        Block(u64),
        Range(u64, u64),
        Data(Vec<u8>),
        Hash(Vec<u8>),
    }

    fn collect_ops(target: &[u8], source: &[u8], block_size: usize) -> Vec<Op> {
        let mut differ: Differ<_> = Differ::new(
            Cursor::new(source.to_vec()),
            signature_of(target, block_size),
            block_size,
        );
        let mut ops = Vec::new();
        while let Some(op) = differ.next_op().expect("in-memory reads cannot fail") {
            ops.push(match op {
                Operation::Block { index } => Op::Block(index),
                Operation::BlockRange { index, end } => Op::Range(index, end),
                Operation::Data(bytes) => Op::Data(bytes.to_vec()),
                Operation::Hash(bytes) => Op::Hash(bytes.to_vec()),
            });
        }
        ops
    }

    fn stream_hash(data: &[u8]) -> Vec<u8> {
        let mut checksummer = Xxh3_128::default();
        checksummer.update(data);
        checksummer.digest().to_vec()
    }

    #[test]
    fn identical_content_coalesces_into_one_range() {
        let ops = collect_ops(b"abcdefgh", b"abcdefgh", 4);
        assert_eq!(
            ops,
            vec![Op::Range(0, 1), Op::Hash(stream_hash(b"abcdefgh"))]
        );
    }

    #[test]
    fn inserted_bytes_split_the_matches() {
        let ops = collect_ops(b"abcdefgh", b"abcdXXXXefgh", 4);
        assert_eq!(
            ops,
            vec![
                Op::Block(0),
                Op::Data(b"XXXX".to_vec()),
                Op::Block(1),
                Op::Hash(stream_hash(b"abcdXXXXefgh")),
            ]
        );
    }

    #[test]
    fn prefixed_source_leads_with_a_literal() {
        let ops = collect_ops(b"abcdefgh", b"XYZabcdefgh", 4);
        assert_eq!(
            ops,
            vec![
                Op::Data(b"XYZ".to_vec()),
                Op::Range(0, 1),
                Op::Hash(stream_hash(b"XYZabcdefgh")),
            ]
        );
    }

    #[test]
    fn empty_source_is_just_the_hash() {
        let ops = collect_ops(b"abcdefgh", b"", 4);
        assert_eq!(ops, vec![Op::Hash(stream_hash(b""))]);
    }

    #[test]
    fn empty_target_makes_everything_literal() {
        let ops = collect_ops(b"", b"abc", 4);
        assert_eq!(
            ops,
            vec![Op::Data(b"abc".to_vec()), Op::Hash(stream_hash(b"abc"))]
        );
    }

    #[test]
    fn trailing_short_block_matches_at_its_short_length() {
        // Three target blocks of 4, 4, and 1 bytes; the final one-byte block
        // still joins the range.
        let ops = collect_ops(b"abcdefghi", b"abcdefghi", 4);
        assert_eq!(
            ops,
            vec![Op::Range(0, 2), Op::Hash(stream_hash(b"abcdefghi"))]
        );
    }

    #[test]
    fn appended_bytes_become_one_trailing_literal() {
        let ops = collect_ops(b"abcdefgh", b"abcdefghXY", 4);
        assert_eq!(
            ops,
            vec![
                Op::Range(0, 1),
                Op::Data(b"XY".to_vec()),
                Op::Hash(stream_hash(b"abcdefghXY")),
            ]
        );
    }

    #[test]
    fn non_consecutive_matches_stay_separate() {
        // Source reorders the target's blocks, so nothing can coalesce.
        let ops = collect_ops(b"abcdefgh", b"efghabcd", 4);
        assert_eq!(
            ops,
            vec![
                Op::Block(1),
                Op::Block(0),
                Op::Hash(stream_hash(b"efghabcd")),
            ]
        );
    }

    #[test]
    fn long_mismatch_survives_buffer_wraps_as_one_literal() {
        // With block_size 4 the buffer holds 32 bytes; a 100-byte literal run
        // forces several wraps yet must surface as a single Data operation.
        let source: Vec<u8> = (0..100u8).collect();
        let ops = collect_ops(b"zzzz", &source, 4);
        assert_eq!(
            ops,
            vec![Op::Data(source.clone()), Op::Hash(stream_hash(&source))]
        );
    }

    #[test]
    fn match_after_buffer_wrap_is_found() {
        let target = b"ABCD";
        let mut source: Vec<u8> = (0..60u8).collect();
        source.extend_from_slice(target);
        let ops = collect_ops(target, &source, 4);
        assert_eq!(
            ops,
            vec![
                Op::Data((0..60u8).collect()),
                Op::Block(0),
                Op::Hash(stream_hash(&source)),
            ]
        );
    }

    #[test]
    fn no_two_consecutive_literals_or_coalescible_blocks() {
        // A source that alternates matches and mismatches across wraps.
        let target: Vec<u8> = (0..64u8).collect();
        let mut source = Vec::new();
        for chunk in target.chunks(8) {
            source.extend_from_slice(b"......");
            source.extend_from_slice(chunk);
        }

        let ops = collect_ops(&target, &source, 8);
        for pair in ops.windows(2) {
            match pair {
                [Op::Data(_), Op::Data(_)] => panic!("adjacent literals: {pair:?}"),
                [Op::Block(a), Op::Block(b)] => {
                    assert_ne!(a + 1, *b, "uncoalesced adjacent blocks")
                }
                [Op::Range(_, a), Op::Block(b)] => {
                    assert_ne!(a + 1, *b, "uncoalesced range extension")
                }
                _ => {}
            }
        }
        assert!(matches!(ops.last(), Some(Op::Hash(_))));
    }

    #[test]
    fn stats_count_literals_and_matches() {
        let mut differ: Differ<_> = Differ::new(
            Cursor::new(b"abcdXXXXefgh".to_vec()),
            signature_of(b"abcdefgh", 4),
            4,
        );
        while differ.next_op().expect("in-memory reads cannot fail").is_some() {}
        assert_eq!(
            differ.stats(),
            DeltaStats {
                literal_bytes: 4,
                matched_blocks: 2,
            }
        );
    }

    #[test]
    fn generate_delta_drains_the_differ() {
        let mut differ: Differ<_> = Differ::new(
            Cursor::new(b"abcdefgh".to_vec()),
            signature_of(b"abcdefgh", 4),
            4,
        );
        let mut count = 0usize;
        let stats = generate_delta(&mut differ, |_| -> io::Result<()> {
            count += 1;
            Ok(())
        })
        .expect("in-memory reads cannot fail");
        assert_eq!(count, 2);
        assert_eq!(stats.matched_blocks, 2);
    }

    #[test]
    fn source_read_errors_surface_verbatim() {
        struct FailingReader;

        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::TimedOut, "source stalled"))
            }
        }

        let mut differ: Differ<_> =
            Differ::new(FailingReader, signature_of(b"abcdefgh", 4), 4);
        let err = differ.next_op().expect_err("source error");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    #[should_panic(expected = "block size must be positive")]
    fn zero_block_size_panics() {
        let _: Differ<_> = Differ::new(Cursor::new(Vec::new()), Vec::new(), 0);
    }
}
