//! Strong hashes that confirm weak matches and verify whole transfers.
//!
//! Two roles with separate traits: [`StrongHash`] produces the 64-bit
//! per-block digest stored in signatures, and [`Checksummer`] digests the
//! whole reconstructed stream to produce the payload of the final hash
//! operation. The XXH3 implementations below are the reference choice; both
//! transfer peers must instantiate the same algorithms.

/// Streaming 64-bit hash used to confirm weak-checksum candidates.
///
/// A single instance is reused across blocks via
/// [`digest_block`](Self::digest_block), which resets the state, feeds one
/// block, and returns its digest.
pub trait StrongHash: Default {
    /// Feeds additional bytes into the hash state.
    fn update(&mut self, data: &[u8]);

    /// Returns the 64-bit digest of the bytes fed so far.
    fn digest(&self) -> u64;

    /// Clears the state for reuse.
    fn reset(&mut self);

    /// One-shot digest of a single block.
    fn digest_block(&mut self, block: &[u8]) -> u64 {
        self.reset();
        self.update(block);
        self.digest()
    }
}

/// Streaming digest over an entire reconstructed stream.
///
/// The digest can be taken at any point without consuming the state; the
/// engine reads it once, after the last byte, to produce and to verify the
/// trailing hash operation.
pub trait Checksummer: Default {
    /// Finalized digest bytes.
    type Digest: AsRef<[u8]> + Copy + Eq;

    /// Length of the finalized digest in bytes.
    const DIGEST_LEN: usize;

    /// Feeds additional bytes into the digest state.
    fn update(&mut self, data: &[u8]);

    /// Returns the digest of everything fed so far.
    fn digest(&self) -> Self::Digest;
}

/// XXH3 in 64-bit mode, the reference block hash.
#[derive(Clone)]
pub struct Xxh3 {
    inner: xxhash_rust::xxh3::Xxh3,
}

impl Default for Xxh3 {
    fn default() -> Self {
        Self {
            inner: xxhash_rust::xxh3::Xxh3::new(),
        }
    }
}

impl StrongHash for Xxh3 {
    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn digest(&self) -> u64 {
        self.inner.digest()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// XXH3 in 128-bit mode, the reference stream checksummer.
///
/// The digest is the canonical big-endian representation (high 64 bits
/// first), 16 bytes.
#[derive(Clone)]
pub struct Xxh3_128 {
    inner: xxhash_rust::xxh3::Xxh3,
}

impl Default for Xxh3_128 {
    fn default() -> Self {
        Self {
            inner: xxhash_rust::xxh3::Xxh3::new(),
        }
    }
}

impl Checksummer for Xxh3_128 {
    type Digest = [u8; 16];

    const DIGEST_LEN: usize = 16;

    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn digest(&self) -> [u8; 16] {
        self.inner.digest128().to_be_bytes()
    }
}
