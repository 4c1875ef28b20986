//! crates/delta/src/index.rs
//!
//! Weak-checksum index over a target signature.

use protocol::BlockHash;
use rustc_hash::FxHashMap;

/// Multimap from weak checksum to the signature entries sharing it.
///
/// A bucket holds a single entry in the common case; colliding entries keep
/// their target order so the first strong match wins.
#[derive(Clone, Debug)]
pub(crate) struct SignatureIndex {
    buckets: FxHashMap<u32, Vec<BlockHash>>,
}

impl SignatureIndex {
    pub(crate) fn new(signature: impl IntoIterator<Item = BlockHash>) -> Self {
        let mut buckets: FxHashMap<u32, Vec<BlockHash>> = FxHashMap::default();
        for entry in signature {
            buckets.entry(entry.weak).or_default().push(entry);
        }
        Self { buckets }
    }

    /// Entries whose weak checksum equals `weak`, in target order.
    pub(crate) fn get(&self, weak: u32) -> Option<&[BlockHash]> {
        self.buckets.get(&weak).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u64, weak: u32, strong: u64) -> BlockHash {
        BlockHash {
            index,
            weak,
            strong,
        }
    }

    #[test]
    fn colliding_entries_share_a_bucket_in_order() {
        let index = SignatureIndex::new([
            entry(0, 10, 100),
            entry(1, 20, 200),
            entry(2, 10, 300),
        ]);

        let bucket = index.get(10).expect("bucket");
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].index, 0);
        assert_eq!(bucket[1].index, 2);
    }

    #[test]
    fn missing_weak_values_have_no_bucket() {
        let index = SignatureIndex::new([entry(0, 10, 100)]);
        assert!(index.get(11).is_none());
    }

    #[test]
    fn empty_signature_builds_an_empty_index() {
        let index = SignatureIndex::new([]);
        assert!(index.get(0).is_none());
    }
}
