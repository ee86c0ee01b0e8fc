//! Aggregation kernels that every launcher shares. Nothing in here knows
//! about ranks, files or threads; callers hand in the rows of their shard.
use num_traits::Zero;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

use crate::error::{AggregateError, Result};

/// Sums every value of a shard.
pub fn total<T: Zero>(values: impl IntoIterator<Item = T>) -> T {
    values.into_iter().fold(T::zero(), |acc, x| acc + x)
}

/// Collects the distinct keys in the order they are first seen.
pub fn discover_keys<'a, K>(keys: impl IntoIterator<Item = &'a K>) -> Vec<K>
where
    K: 'a + Eq + Hash + Clone,
{
    let mut seen = HashSet::new();
    let mut ordered = vec![];
    for key in keys {
        if seen.insert(key) {
            ordered.push(key.clone());
        }
    }
    ordered
}

/// Sums the values of every row whose key belongs to `shard`. The output
/// follows the order of `shard`, and keys without rows sum to zero.
pub fn keyed_sums<'a, K, T>(rows: impl IntoIterator<Item = (&'a K, T)>, shard: &[K]) -> Vec<(K, T)>
where
    K: 'a + Eq + Hash + Clone,
    T: Zero + Copy,
{
    let mut sums: HashMap<&K, T> = shard.iter().map(|key| (key, T::zero())).collect();

    for (key, value) in rows {
        if let Some(sum) = sums.get_mut(key) {
            *sum = *sum + value;
        }
    }

    shard.iter().map(|key| (key.clone(), sums[key])).collect()
}

/// Concatenates per-shard tables. Shards are expected to own disjoint keys,
/// so a repeated key means the partitioning is broken.
pub fn merge_disjoint<K, T>(partials: impl IntoIterator<Item = Vec<(K, T)>>) -> Result<Vec<(K, T)>>
where
    K: Eq + Hash + Clone + Display,
{
    let mut seen = HashSet::new();
    let mut merged = vec![];
    for partial in partials {
        for (key, value) in partial {
            if !seen.insert(key.clone()) {
                return Err(AggregateError::OverlappingShards(key.to_string()));
            }
            merged.push((key, value));
        }
    }
    Ok(merged)
}

#[test]
fn test_total_of_units() {
    let units: Vec<i64> = (1..=9).collect();
    assert_eq!(total(units), 45);
}

#[test]
fn test_total_of_empty_shard_is_zero() {
    assert_eq!(total(Vec::<f64>::new()), 0.0);
}

#[test]
fn test_discover_keys_keeps_first_seen_order() {
    let rows = ["C", "A", "C", "B", "A", "D"];
    assert_eq!(discover_keys(rows.iter()), vec!["C", "A", "B", "D"]);
}

#[test]
fn test_keyed_sums_only_counts_shard_keys() {
    let rows = [("A", 4), ("B", 20), ("A", 6), ("C", 30), ("B", 0)];
    let shard = ["B", "A"];
    let sums = keyed_sums(rows.iter().map(|(k, v)| (k, *v)), &shard);
    assert_eq!(sums, vec![("B", 20), ("A", 10)]);
}

#[test]
fn test_keyed_sums_float_values() {
    let rows = [("A", 0.1), ("A", 0.2), ("B", 1.5)];
    let shard = ["A", "B"];
    let sums = keyed_sums(rows.iter().map(|(k, v)| (k, *v)), &shard);
    assert!((sums[0].1 - 0.3_f64).abs() < 1e-12);
    assert!((sums[1].1 - 1.5_f64).abs() < 1e-12);
}

#[test]
fn test_merge_disjoint_concatenates_in_shard_order() {
    let merged = merge_disjoint(vec![vec![("A", 10), ("B", 20)], vec![], vec![("C", 30)]]).unwrap();
    assert_eq!(merged, vec![("A", 10), ("B", 20), ("C", 30)]);
}

#[test]
fn test_merge_disjoint_rejects_overlap() {
    let err = merge_disjoint(vec![vec![("A", 10)], vec![("A", 11)]]).unwrap_err();
    assert!(matches!(err, AggregateError::OverlappingShards(key) if key == "A"));
}
