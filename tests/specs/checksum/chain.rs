//! Checksum chain specs
//!
//! A follower that verifies every entry a leader accumulated ends at the
//! same value; tampering is detected at the first bad entry.

use crate::prelude::*;

const STREAM: StreamId = StreamId(1);

#[test]
fn follower_tracks_leader_over_a_run_of_entries() {
    let mut leader = ChecksumChain::default();
    let mut follower = ChecksumChain::default();
    leader.init(STREAM, 0x5eed).unwrap();
    follower.init(STREAM, 0x5eed).unwrap();

    for entry in (1..=64u64).map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15)) {
        let stamped = leader.accumulate(entry).unwrap();
        follower.verify(entry, stamped).unwrap();
    }
    assert_eq!(follower.verify_checksum(), leader.accum());
}

#[test]
fn tampered_entry_is_rejected_and_chain_holds() {
    let mut leader = ChecksumChain::default();
    let mut follower = ChecksumChain::default();
    leader.init(STREAM, 0).unwrap();
    follower.init(STREAM, 0).unwrap();

    let first = leader.accumulate(0x11).unwrap();
    follower.verify(0x11, first).unwrap();
    let second = leader.accumulate(0x22).unwrap();

    let err = follower.verify(0x23, second).unwrap_err();
    assert!(matches!(err, ChecksumError::ChecksumMismatch { .. }));
    assert_eq!(follower.verify_checksum(), first);

    // The genuine entry still verifies afterwards
    follower.verify(0x22, second).unwrap();
}

#[test]
fn rollback_undoes_exactly_one_entry() {
    let mut chain = ChecksumChain::default();
    chain.init(STREAM, 7).unwrap();
    let before = chain.accumulate(0xa).unwrap();
    let after = chain.accumulate(0xb).unwrap();
    assert_eq!(after, combine(before, 0xb));

    chain.rollback(after).unwrap();
    assert_eq!(chain.accum(), before);
    assert!(matches!(
        chain.rollback(before),
        Err(ChecksumError::NothingToRollback(_))
    ));
}
