//! Randomized delta properties.

use std::io::Cursor;

use delta::{Differ, Patcher};
use proptest::prelude::*;
use protocol::{BlockHash, Operation};
use signature::make_signature;

/// Pumps a full diff/apply cycle in memory and returns the rebuilt source.
fn round_trip(target: &[u8], source: &[u8], block_size: usize) -> Vec<u8> {
    let blocks = make_signature(Cursor::new(target.to_vec()), block_size)
        .collect::<std::io::Result<Vec<_>>>()
        .expect("in-memory reads cannot fail");

    let mut differ: Differ<_> = Differ::new(Cursor::new(source.to_vec()), blocks, block_size);
    let mut output = Vec::new();
    let mut patcher: Patcher<_, _> =
        Patcher::new(Cursor::new(target.to_vec()), &mut output, block_size);

    while let Some(op) = differ.next_op().expect("in-memory reads cannot fail") {
        patcher.apply(&op).expect("checksum must verify");
    }
    drop(patcher);
    output
}

proptest! {
    #[test]
    fn rebuilds_arbitrary_sources(
        target in proptest::collection::vec(any::<u8>(), 0..300),
        source in proptest::collection::vec(any::<u8>(), 0..300),
        block_size in 1usize..9,
    ) {
        prop_assert_eq!(round_trip(&target, &source, block_size), source);
    }

    #[test]
    fn rebuilds_sources_spliced_from_the_target(
        target in proptest::collection::vec(any::<u8>(), 1..400),
        insert in proptest::collection::vec(any::<u8>(), 0..40),
        at in any::<prop::sample::Index>(),
        block_size in 1usize..9,
    ) {
        let split = at.index(target.len());
        let mut source = target[..split].to_vec();
        source.extend_from_slice(&insert);
        source.extend_from_slice(&target[split..]);
        prop_assert_eq!(round_trip(&target, &source, block_size), source);
    }

    #[test]
    fn block_hashes_survive_the_wire(
        index in any::<u64>(),
        weak in any::<u32>(),
        strong in any::<u64>(),
    ) {
        let entry = BlockHash { index, weak, strong };
        prop_assert_eq!(BlockHash::deserialize(&entry.serialize()), Ok(entry));
    }

    #[test]
    fn operations_survive_the_wire(
        index in 0u64..u64::MAX / 2,
        span in 1u64..100_000,
        payload in proptest::collection::vec(any::<u8>(), 0..200),
    ) {
        for op in [
            Operation::Block { index },
            Operation::BlockRange { index, end: index + span },
            Operation::Data(&payload),
            Operation::Hash(&payload[..payload.len().min(64)]),
        ] {
            let mut wire = Vec::new();
            op.serialize(&mut wire).expect("payloads fit the wire limits");
            prop_assert_eq!(wire.len(), op.serialized_len());
            let (decoded, consumed) = Operation::deserialize(&wire).expect("well-formed record");
            prop_assert_eq!(decoded, op);
            prop_assert_eq!(consumed, wire.len());
        }
    }
}
