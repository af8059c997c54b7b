//! Z-sets: finite maps from values to non-zero integer weights.
//!
//! Positive weights count insertions and negative weights deletions, so the
//! same type holds both the contents of a relation and a change to it.
//! Indexed Z-sets reuse the representation with `(key, value)` tuples as
//! elements.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec::Vec;
use core::ops::{AddAssign, Neg};
use zsql_core::{Error, Result, Value};

/// A weighted multiset of values.
///
/// Elements with a zero weight are never stored; iteration follows the total
/// order of `Value`, which keeps evaluation deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZSet {
    rows: BTreeMap<Value, i64>,
}

impl ZSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(value: Value, weight: i64) -> Self {
        let mut zset = Self::new();
        zset.add(value, weight);
        zset
    }

    /// Adds `weight` to the weight of `value`.
    pub fn add(&mut self, value: Value, weight: i64) {
        if weight == 0 {
            return;
        }
        match self.rows.get_mut(&value) {
            Some(current) => {
                *current += weight;
                if *current == 0 {
                    self.rows.remove(&value);
                }
            }
            None => {
                self.rows.insert(value, weight);
            }
        }
    }

    /// Weight of `value`, zero when absent.
    pub fn weight(&self, value: &Value) -> i64 {
        self.rows.get(value).copied().unwrap_or(0)
    }

    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> i64 {
        self.rows.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, i64)> + '_ {
        self.rows.iter().map(|(v, w)| (v, *w))
    }

    pub fn plus(&self, other: &ZSet) -> ZSet {
        let mut sum = self.clone();
        sum += other;
        sum
    }

    pub fn minus(&self, other: &ZSet) -> ZSet {
        self.plus(&-other)
    }

    /// The set of elements with a positive weight, each with weight 1.
    pub fn distinct(&self) -> ZSet {
        self.iter()
            .filter(|(_, w)| *w > 0)
            .map(|(v, _)| (v.clone(), 1))
            .collect()
    }

    /// Returns true if every weight is 1.
    pub fn is_set(&self) -> bool {
        self.rows.values().all(|w| *w == 1)
    }

    /// Returns true if every weight is positive.
    pub fn is_positive(&self) -> bool {
        self.rows.values().all(|w| *w > 0)
    }

    /// Groups the `(key, value)` elements of an indexed Z-set by key.
    pub fn index(&self) -> Result<BTreeMap<Value, ZSet>> {
        let mut groups: BTreeMap<Value, ZSet> = BTreeMap::new();
        for (element, weight) in self.iter() {
            let (key, value) = split_pair(element)?;
            groups
                .entry(key.clone())
                .or_default()
                .add(value.clone(), weight);
        }
        Ok(groups)
    }

    /// Every element repeated by its weight; fails on negative weights.
    pub fn to_multiset(&self) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        for (value, weight) in self.iter() {
            if weight < 0 {
                return Err(Error::evaluation(format!(
                    "Negative weight {} for {}",
                    weight, value
                )));
            }
            for _ in 0..weight {
                rows.push(value.clone());
            }
        }
        Ok(rows)
    }
}

/// The key and value of an indexed Z-set element.
pub fn split_pair(element: &Value) -> Result<(&Value, &Value)> {
    match element.as_tuple() {
        Some([key, value]) => Ok((key, value)),
        _ => Err(Error::evaluation(format!(
            "Expected a (key, value) pair, found {}",
            element
        ))),
    }
}

/// Builds an indexed Z-set element.
pub fn pair(key: Value, value: Value) -> Value {
    Value::tuple(alloc::vec![key, value])
}

impl AddAssign<&ZSet> for ZSet {
    fn add_assign(&mut self, other: &ZSet) {
        for (value, weight) in other.iter() {
            let entry = self.rows.entry(value.clone()).or_insert(0);
            *entry += weight;
        }
        self.rows.retain(|_, w| *w != 0);
    }
}

impl Neg for &ZSet {
    type Output = ZSet;

    fn neg(self) -> ZSet {
        ZSet {
            rows: self.rows.iter().map(|(v, w)| (v.clone(), -w)).collect(),
        }
    }
}

impl FromIterator<(Value, i64)> for ZSet {
    fn from_iter<I: IntoIterator<Item = (Value, i64)>>(iter: I) -> Self {
        let mut zset = ZSet::new();
        zset.extend(iter);
        zset
    }
}

impl Extend<(Value, i64)> for ZSet {
    fn extend<I: IntoIterator<Item = (Value, i64)>>(&mut self, iter: I) {
        for (value, weight) in iter {
            *self.rows.entry(value).or_insert(0) += weight;
        }
        self.rows.retain(|_, w| *w != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn row(v: i32) -> Value {
        Value::tuple(vec![Value::Int32(v)])
    }

    #[test]
    fn test_zero_weights_disappear() {
        let mut zset = ZSet::singleton(row(1), 2);
        zset.add(row(1), -2);
        assert!(zset.is_empty());
        zset.add(row(2), 0);
        assert!(zset.is_empty());
    }

    #[test]
    fn test_plus_minus_negate() {
        let a: ZSet = vec![(row(1), 1), (row(2), 3)].into_iter().collect();
        let b: ZSet = vec![(row(2), 3), (row(3), -1)].into_iter().collect();
        let sum = a.plus(&b);
        assert_eq!(sum.weight(&row(2)), 6);
        assert_eq!(sum.weight(&row(3)), -1);
        assert_eq!(sum.minus(&b), a);
        assert!((-&a).iter().all(|(_, w)| w < 0));
    }

    #[test]
    fn test_distinct_drops_non_positive() {
        let zset: ZSet = vec![(row(1), 3), (row(2), -1)].into_iter().collect();
        let distinct = zset.distinct();
        assert_eq!(distinct.len(), 1);
        assert!(distinct.is_set());
        assert!(!zset.is_positive());
    }

    #[test]
    fn test_index_groups_by_key() {
        let zset: ZSet = vec![
            (pair(Value::Int32(1), row(10)), 1),
            (pair(Value::Int32(1), row(11)), 2),
            (pair(Value::Int32(2), row(20)), 1),
        ]
        .into_iter()
        .collect();
        let groups = zset.index().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&Value::Int32(1)].total_weight(), 3);
        assert!(ZSet::singleton(row(1), 1).index().is_err());
    }

    #[test]
    fn test_to_multiset() {
        let zset = ZSet::singleton(row(4), 2);
        assert_eq!(zset.to_multiset().unwrap(), vec![row(4), row(4)]);
        assert!(ZSet::singleton(row(4), -1).to_multiset().is_err());
    }
}
