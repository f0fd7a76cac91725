//! Property-Based Tests for Cache Key Handling
//!
//! Uses proptest to verify the glob matcher, key sharding, and the value
//! codec envelope across a wide range of inputs.

#![cfg(test)]

use proptest::prelude::*;

use super::backend::key_matches;
use super::codec::ValueCodec;
use super::key::CacheKey;
use crate::config::SerializationFormat;

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for key segments without glob metacharacters or separators
fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,16}"
}

fn key_strategy() -> impl Strategy<Value = CacheKey> {
    (segment_strategy(), segment_strategy(), segment_strategy())
        .prop_map(|(ns, entity, id)| CacheKey::new(ns, entity, id))
}

// =============================================================================
// Glob Matcher Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: a literal pattern matches exactly itself.
    #[test]
    fn prop_literal_pattern_matches_itself(key in key_strategy()) {
        let storage = key.storage_key();
        prop_assert!(key_matches(&storage, &storage));
    }

    /// Property: `*` matches every key.
    #[test]
    fn prop_star_matches_everything(key in key_strategy()) {
        prop_assert!(key_matches("*", &key.storage_key()));
    }

    /// Property: a namespace prefix pattern matches all keys in that
    /// namespace and none outside it.
    #[test]
    fn prop_prefix_pattern_scopes_namespace(
        key in key_strategy(),
        other_ns in segment_strategy(),
    ) {
        let pattern = format!("{}:*", key.namespace());
        prop_assert!(key_matches(&pattern, &key.storage_key()));

        prop_assume!(other_ns != key.namespace());
        let foreign = CacheKey::new(other_ns, key.entity(), key.id());
        prop_assert!(!key_matches(&pattern, &foreign.storage_key()));
    }

    /// Property: replacing any one character with `?` still matches.
    #[test]
    fn prop_question_mark_matches_any_single_char(
        key in key_strategy(),
        pos_seed in any::<usize>(),
    ) {
        let storage = key.storage_key();
        let pos = pos_seed % storage.len();
        let mut pattern: Vec<char> = storage.chars().collect();
        pattern[pos] = '?';
        let pattern: String = pattern.into_iter().collect();
        prop_assert!(key_matches(&pattern, &storage));
    }
}

// =============================================================================
// Sharding Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: the shard index is always within the shard count.
    #[test]
    fn prop_shard_index_in_bounds(key in key_strategy(), shards in 1u32..=1024) {
        prop_assert!(key.shard_index(shards) < shards);
    }

    /// Property: hashing is deterministic across calls.
    #[test]
    fn prop_stable_hash_is_deterministic(key in key_strategy()) {
        prop_assert_eq!(key.stable_hash(), key.stable_hash());
        prop_assert_eq!(key.shard_index(16), key.shard_index(16));
    }
}

// =============================================================================
// Codec Envelope Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: compression never changes what decodes back out, for
    /// payloads on both sides of the compression threshold.
    #[test]
    fn prop_compression_is_transparent(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let plain = ValueCodec::new(SerializationFormat::Binary, false);
        let packed = ValueCodec::new(SerializationFormat::Binary, true);

        let decoded: Vec<u8> = plain.decode(&plain.encode(&data)?)?;
        prop_assert_eq!(&decoded, &data);

        let decoded: Vec<u8> = packed.decode(&packed.encode(&data)?)?;
        prop_assert_eq!(&decoded, &data);

        // A compressing writer and a plain reader agree through the envelope
        let decoded: Vec<u8> = plain.decode(&packed.encode(&data)?)?;
        prop_assert_eq!(decoded, data);
    }
}
