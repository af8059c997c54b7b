//! Property-based tests for Z-set arithmetic.

use proptest::prelude::*;
use zsql_core::Value;
use zsql_incremental::ZSet;

fn zset_strategy() -> impl Strategy<Value = ZSet> {
    prop::collection::vec((0i32..20, -3i64..4), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(v, w)| (Value::tuple(vec![Value::Int32(v)]), w))
            .collect()
    })
}

proptest! {
    /// No element is ever stored with weight zero.
    #[test]
    fn no_zero_weights(a in zset_strategy(), b in zset_strategy()) {
        let sum = a.plus(&b);
        prop_assert!(sum.iter().all(|(_, w)| w != 0));
        prop_assert!(a.minus(&a).is_empty());
    }

    /// Addition is commutative and associative.
    #[test]
    fn plus_is_commutative_and_associative(
        a in zset_strategy(),
        b in zset_strategy(),
        c in zset_strategy()
    ) {
        prop_assert_eq!(a.plus(&b), b.plus(&a));
        prop_assert_eq!(a.plus(&b).plus(&c), a.plus(&b.plus(&c)));
    }

    /// Weights of a sum are sums of weights.
    #[test]
    fn total_weight_is_additive(a in zset_strategy(), b in zset_strategy()) {
        prop_assert_eq!(a.plus(&b).total_weight(), a.total_weight() + b.total_weight());
        prop_assert_eq!((-&a).total_weight(), -a.total_weight());
    }

    /// Distinct yields a set holding exactly the positively weighted elements.
    #[test]
    fn distinct_is_idempotent(a in zset_strategy()) {
        let distinct = a.distinct();
        prop_assert!(distinct.is_set());
        prop_assert_eq!(distinct.distinct(), distinct.clone());
        for (value, weight) in a.iter() {
            prop_assert_eq!(distinct.weight(value), if weight > 0 { 1 } else { 0 });
        }
    }
}
