//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key normalization, tenant isolation, decay order
//! and the capacity bound over generated inputs.

use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

use crate::cache::{generate_cache_key, CachePolicy, CacheStore, Freshness};

// == Strategies ==
fn param_strategy() -> impl Strategy<Value = (String, String)> {
    ("[a-zA-Z]{1,8}", "[a-zA-Z0-9-]{0,12}")
}

fn scoped_path_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("/brands"), Just("/topics"), Just("/prompts"), Just("/dashboard")],
        "[a-z0-9]{1,6}",
    )
        .prop_map(|(prefix, id)| format!("{prefix}/{id}"))
}

fn policy_strategy() -> impl Strategy<Value = CachePolicy> {
    (1u64..600, 0u64..600, 0u64..600).prop_map(|(ttl, stale_extra, max_extra)| {
        CachePolicy::new(
            Duration::from_secs(ttl),
            Duration::from_secs(ttl + stale_extra),
            Duration::from_secs(ttl + stale_extra + max_extra),
            false,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any permutation of the same params yields the same key.
    #[test]
    fn prop_key_ignores_param_order(
        params in prop::collection::vec(param_strategy(), 0..8),
        seed in any::<u64>(),
    ) {
        let mut shuffled = params.clone();
        // deterministic rotation + reversal covers a useful set of permutations
        if !shuffled.is_empty() {
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            if seed % 2 == 0 {
                shuffled.reverse();
            }
        }

        prop_assert_eq!(
            generate_cache_key("/topics", &params, Some("c1")),
            generate_cache_key("/topics", &shuffled, Some("c1"))
        );
    }

    // Params that differ after sorting never share a key, even when values
    // carry reserved characters.
    #[test]
    fn prop_distinct_params_never_collide(
        a in prop::collection::vec(("[a-z&=+ ]{1,4}", "[a-z0-9&=+% ]{0,4}"), 0..4),
        b in prop::collection::vec(("[a-z&=+ ]{1,4}", "[a-z0-9&=+% ]{0,4}"), 0..4),
    ) {
        let mut sorted_a = a.clone();
        let mut sorted_b = b.clone();
        sorted_a.sort();
        sorted_b.sort();
        prop_assume!(sorted_a != sorted_b);
        prop_assert_ne!(
            generate_cache_key("/topics", &a, None),
            generate_cache_key("/topics", &b, None)
        );
    }

    // Different tenants on a tenant-scoped path never share a key.
    #[test]
    fn prop_tenants_never_collide(
        path in scoped_path_strategy(),
        params in prop::collection::vec(param_strategy(), 0..4),
        a in "[a-z0-9-]{1,10}",
        b in "[a-z0-9-]{1,10}",
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(
            generate_cache_key(&path, &params, Some(&a)),
            generate_cache_key(&path, &params, Some(&b))
        );
    }

    // Freshness never moves backwards as time advances.
    #[test]
    fn prop_freshness_is_monotonic(
        policy in policy_strategy(),
        offsets in prop::collection::vec(0u64..2_000_000, 1..20),
    ) {
        let mut store = CacheStore::new(10);
        store.set("k", json!(1), policy, 0);

        prop_assert_eq!(store.freshness("k", 0), Some(Freshness::Fresh));

        let mut offsets = offsets;
        offsets.sort_unstable();
        let mut previous = Freshness::Fresh;
        for now in offsets {
            let current = store.freshness("k", now).unwrap();
            prop_assert!(current >= previous, "{:?} came after {:?}", current, previous);
            previous = current;
        }
    }

    // Right at each boundary the entry has moved to the next state.
    #[test]
    fn prop_boundaries_are_half_open(policy in policy_strategy()) {
        let mut store = CacheStore::new(10);
        store.set("k", json!(1), policy, 0);

        let ttl = policy.ttl.as_millis() as u64;
        let max_age = policy.max_age.as_millis() as u64;

        prop_assert_eq!(store.freshness("k", ttl - 1), Some(Freshness::Fresh));
        prop_assert_ne!(store.freshness("k", ttl), Some(Freshness::Fresh));
        prop_assert_eq!(store.freshness("k", max_age), Some(Freshness::Expired));
        prop_assert!(store.get("k", max_age).is_none());
        prop_assert!(store.get_any("k").is_some());
    }

    // The number of entries never exceeds the capacity bound.
    #[test]
    fn prop_capacity_enforcement(
        keys in prop::collection::vec("[a-z]{1,6}", 1..100),
        capacity in 1usize..20,
    ) {
        let mut store = CacheStore::new(capacity);
        for key in &keys {
            store.set(key, json!(key), CachePolicy::default(), 0);
            prop_assert!(store.len() <= capacity);
        }

        // the most recent key always survives
        let last = keys.last().unwrap();
        prop_assert!(store.entry(last).is_some());
    }
}
