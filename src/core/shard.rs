//! Stable account-to-shard mapping
//!
//! The shard of an account is derived from an MD5 digest of its id, so the
//! mapping is uniform and identical across processes and restarts for a given
//! shard count.

/// Shard index of an id for `shard_count` shards
///
/// The first four digest bytes are read big-endian and masked to a positive
/// value before the modulo. A zero `shard_count` maps every id to shard 0,
/// which the call queue then rejects as out of range.
pub fn shard_index(id: &str, shard_count: usize) -> usize {
    let digest = md5::compute(id.as_bytes()).0;
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & 0x0fff_ffff;
    value as usize % shard_count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn test_index_is_within_range() {
        for shard_count in 1..=10 {
            for _ in 0..100 {
                let id = uuid::Uuid::new_v4().to_string();
                let index = shard_index(&id, shard_count);
                assert!(index < shard_count);
            }
        }
    }

    #[rstest]
    #[case("alice")]
    #[case("cash-desk-in")]
    #[case("")]
    fn test_same_id_maps_to_same_shard(#[case] id: &str) {
        assert_eq!(shard_index(id, 16), shard_index(id, 16));
    }

    #[test]
    fn test_single_shard_takes_everything() {
        assert_eq!(shard_index("anything", 1), 0);
    }

    #[test]
    fn test_zero_shards_does_not_panic() {
        assert_eq!(shard_index("anything", 0), 0);
    }

    #[test]
    fn test_ids_spread_over_shards() {
        let used: HashSet<usize> = (0..1000)
            .map(|i| shard_index(&format!("account-{}", i), 8))
            .collect();
        assert_eq!(used.len(), 8);
    }
}
