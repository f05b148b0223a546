//! Property-based test generators using proptest.

use logroll_core::RetentionPolicy;
use proptest::prelude::*;

/// Strategy for segment size limits small enough to rotate often.
pub fn segment_size_strategy() -> impl Strategy<Value = u64> {
    8u64..256
}

/// Strategy for a sequence of write lengths, each in `1..=max_len`.
pub fn write_lengths_strategy(max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1..=max_len, 1..64)
}

/// Strategy for a sequence of non-empty payloads.
pub fn payloads_strategy(max_len: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..=max_len), 1..48)
}

/// Strategy for count-only retention policies.
pub fn retention_policy_strategy() -> impl Strategy<Value = RetentionPolicy> {
    (0usize..6).prop_map(RetentionPolicy::new)
}

/// A payload of `len` bytes tagged with `index`, so reordering is visible.
///
/// The first bytes spell the index in decimal; the rest is filler.
pub fn tagged_payload(index: usize, len: usize) -> Vec<u8> {
    let tag = format!("{index:08}|");
    let mut payload = tag.into_bytes();
    payload.resize(len.max(payload.len()), b'.');
    payload.truncate(len.max(1));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_payload_has_requested_length() {
        assert_eq!(tagged_payload(7, 12), b"00000007|...".to_vec());
        assert_eq!(tagged_payload(7, 3).len(), 3);
        assert_eq!(tagged_payload(7, 0).len(), 1);
    }

    proptest! {
        #[test]
        fn write_lengths_are_non_empty(lengths in write_lengths_strategy(40)) {
            prop_assert!(lengths.iter().all(|&len| (1..=40).contains(&len)));
        }
    }
}
