use clap::ValueEnum;
use std::ops::Range;

use crate::error::{AggregateError, Result};
use crate::Rank;

/// What to do with the keys left over when `keys % workers != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RemainderPolicy {
    /// Refuse to partition unless the keys divide evenly
    Fail,
    /// Leave the trailing `keys % workers` keys out of every shard
    Drop,
    /// Give the lowest ranks one extra key each
    Redistribute,
}

fn validate(rank: Rank, size: usize) -> Result<()> {
    if size == 0 {
        return Err(AggregateError::NoWorkers);
    }
    if rank >= size {
        return Err(AggregateError::RankOutOfRange { rank, size });
    }
    Ok(())
}

/// Checks that there is exactly one worker per input unit.
pub fn check_unit_count(units: usize, size: usize) -> Result<()> {
    if size == 0 {
        return Err(AggregateError::NoWorkers);
    }
    if units != size {
        return Err(AggregateError::ShardAssignment { units, size });
    }
    Ok(())
}

/// Returns the unit (e.g. the year file) owned by `rank`.
pub fn assign_unit<U: Clone>(units: &[U], rank: Rank, size: usize) -> Result<U> {
    validate(rank, size)?;
    check_unit_count(units.len(), size)?;
    Ok(units[rank].clone())
}

/// Calculates the contiguous range of key indices `rank` works on.
pub fn key_range(
    total_keys: usize,
    rank: Rank,
    size: usize,
    policy: RemainderPolicy,
) -> Result<Range<usize>> {
    validate(rank, size)?;

    let local_size = total_keys / size;
    let remainder = total_keys % size;

    match policy {
        _ if remainder == 0 => Ok(rank * local_size..(rank + 1) * local_size),
        RemainderPolicy::Fail => Err(AggregateError::UnevenKeys {
            keys: total_keys,
            size,
        }),
        RemainderPolicy::Drop => Ok(rank * local_size..(rank + 1) * local_size),
        RemainderPolicy::Redistribute => {
            let start = rank * local_size + rank.min(remainder);
            let len = local_size + usize::from(rank < remainder);
            Ok(start..start + len)
        }
    }
}

/// Slices out the keys owned by `rank`.
pub fn local_keys<K>(keys: &[K], rank: Rank, size: usize, policy: RemainderPolicy) -> Result<&[K]> {
    Ok(&keys[key_range(keys.len(), rank, size, policy)?])
}

/// Indices of the keys that no rank receives.
pub fn dropped_keys(total_keys: usize, size: usize, policy: RemainderPolicy) -> Range<usize> {
    if policy == RemainderPolicy::Drop && size > 0 {
        total_keys - total_keys % size..total_keys
    } else {
        total_keys..total_keys
    }
}

#[test]
fn test_assign_unit_one_per_rank() {
    let years = [2014, 2015, 2016];
    let assigned: Vec<usize> = (0..3).map(|rank| assign_unit(&years, rank, 3).unwrap()).collect();
    assert_eq!(assigned, years);
}

#[test]
fn test_assign_unit_fails_fast_on_mismatch() {
    let years = [2014, 2015, 2016];
    assert!(matches!(
        assign_unit(&years, 0, 2),
        Err(AggregateError::ShardAssignment { units: 3, size: 2 })
    ));
    assert!(matches!(
        assign_unit(&years, 3, 4),
        Err(AggregateError::ShardAssignment { units: 3, size: 4 })
    ));
}

#[test]
fn test_assign_unit_rejects_bad_rank() {
    let years = [2014, 2015];
    assert!(matches!(
        assign_unit(&years, 2, 2),
        Err(AggregateError::RankOutOfRange { rank: 2, size: 2 })
    ));
    assert!(matches!(assign_unit(&years, 0, 0), Err(AggregateError::NoWorkers)));
}

#[test]
fn test_key_range_even_split() {
    let keys = ["A", "B", "C", "D"];
    assert_eq!(local_keys(&keys, 0, 2, RemainderPolicy::Fail).unwrap(), ["A", "B"]);
    assert_eq!(local_keys(&keys, 1, 2, RemainderPolicy::Fail).unwrap(), ["C", "D"]);
}

#[test]
fn test_key_range_uneven_fails_by_default() {
    assert!(matches!(
        key_range(4, 0, 3, RemainderPolicy::Fail),
        Err(AggregateError::UnevenKeys { keys: 4, size: 3 })
    ));
}

#[test]
fn test_key_range_drop_excludes_trailing_keys() {
    let keys = ["A", "B", "C", "D"];
    let shards: Vec<&[&str]> = (0..3)
        .map(|rank| local_keys(&keys, rank, 3, RemainderPolicy::Drop).unwrap())
        .collect();
    assert_eq!(shards, vec![&["A"][..], &["B"][..], &["C"][..]]);

    let dropped = dropped_keys(keys.len(), 3, RemainderPolicy::Drop);
    assert_eq!(&keys[dropped], ["D"]);
}

#[test]
fn test_key_range_drop_excludes_exactly_the_remainder() {
    for total_keys in 0..40 {
        for size in 1..9 {
            let covered: usize = (0..size)
                .map(|rank| key_range(total_keys, rank, size, RemainderPolicy::Drop).unwrap().len())
                .sum();
            assert_eq!(covered, total_keys - total_keys % size);
            assert_eq!(dropped_keys(total_keys, size, RemainderPolicy::Drop).len(), total_keys % size);
        }
    }
}

#[test]
fn test_key_range_redistribute_covers_every_key_once() {
    for total_keys in 0..40 {
        for size in 1..9 {
            let mut next = 0;
            for rank in 0..size {
                let range = key_range(total_keys, rank, size, RemainderPolicy::Redistribute).unwrap();
                assert_eq!(range.start, next);
                assert!(range.len() == total_keys / size || range.len() == total_keys / size + 1);
                next = range.end;
            }
            assert_eq!(next, total_keys);
            assert!(dropped_keys(total_keys, size, RemainderPolicy::Redistribute).is_empty());
        }
    }
}

#[test]
fn test_key_range_more_workers_than_keys() {
    assert_eq!(key_range(2, 2, 3, RemainderPolicy::Drop).unwrap(), 0..0);
    assert_eq!(key_range(2, 1, 3, RemainderPolicy::Redistribute).unwrap(), 1..2);
    assert_eq!(key_range(2, 2, 3, RemainderPolicy::Redistribute).unwrap(), 2..2);
}
