//! Version vector construction (spec.md §4.B).

/// A single counter in a version vector: a device-id projection paired
/// with the sequence value that device last announced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Counter {
    /// Device identity, projected to a `u64` (see [`projected_device_id`]).
    pub id: u64,
    /// Sequence value announced by that device.
    pub value: u64,
}

/// An ordered sequence of [`Counter`]s expressing the causal history of a
/// file.
pub type VersionVector = Vec<Counter>;

/// Projects a device id's raw bytes to the `u64` used as a version-vector
/// counter id: the first 8 bytes of the SHA-256 digest of the device id,
/// interpreted big-endian.
#[must_use]
pub fn projected_device_id(device_id_bytes: &[u8]) -> u64 {
    let digest = checksums::Sha256::digest(device_id_bytes);
    let mut first_eight = [0u8; 8];
    first_eight.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(first_eight)
}

/// Builds the new version vector for a record about to be announced.
///
/// Copies every counter in `previous` verbatim, in order, then appends one
/// new counter for `local_device_id` carrying `sequence`. The new counter
/// is always appended, never merged into an existing counter for the same
/// device -- spec.md §3 calls this out explicitly as bit-compatibility with
/// the reference implementation, not an oversight.
#[must_use]
pub fn build_vector(
    previous: Option<&[Counter]>,
    local_device_id: &[u8],
    sequence: u64,
) -> VersionVector {
    let mut vector: VersionVector = previous.map(<[Counter]>::to_vec).unwrap_or_default();
    vector.push(Counter {
        id: projected_device_id(local_device_id),
        value: sequence,
    });
    vector
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_counters() -> impl Strategy<Value = Vec<Counter>> {
        proptest::collection::vec(
            (any::<u64>(), any::<u64>()).prop_map(|(id, value)| Counter { id, value }),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn build_vector_always_appends_exactly_one_counter(
            previous in arb_counters(),
            device_id in proptest::collection::vec(any::<u8>(), 0..32),
            sequence in any::<u64>(),
        ) {
            let next = build_vector(Some(&previous), &device_id, sequence);
            prop_assert_eq!(next.len(), previous.len() + 1);
            prop_assert_eq!(&next[..previous.len()], &previous[..]);
            prop_assert_eq!(next.last().unwrap().value, sequence);
            prop_assert_eq!(next.last().unwrap().id, projected_device_id(&device_id));
        }

        #[test]
        fn projected_device_id_is_pure(
            device_id in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assert_eq!(projected_device_id(&device_id), projected_device_id(&device_id));
        }
    }
}
