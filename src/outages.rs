//! Outage totals, wired from the loader through the partitioner into
//! whichever launcher runs them.
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::spawn;
use std::time::Duration;

use crate::aggregate::{discover_keys, keyed_sums};
use crate::error::{AggregateError, Result};
use crate::utils::collective::collective;
use crate::utils::loader::{OutageLoader, OutageRecord};
use crate::utils::output::{CountyTable, SharedSink};
use crate::utils::partition::{assign_unit, check_unit_count, dropped_keys, key_range, local_keys, RemainderPolicy};
use crate::utils::Handles;
use crate::{FipsCode, OutageCount, Rank, Year};

#[cfg(feature = "multinode")]
use crate::utils::{balancer::Balancer, output};
#[cfg(feature = "multinode")]
use std::path::Path;

/// The partial for one rank when each rank owns one year.
pub fn yearly_partial(loader: &OutageLoader, years: &[Year], rank: Rank, size: usize) -> Result<OutageCount> {
    let year = assign_unit(years, rank, size)?;
    let partial = loader.year_total(year)?;
    debug!("rank {rank} summed {partial} outages for {year}");
    Ok(partial)
}

/// Sums every year one after the other.
pub fn sequential_total(loader: &OutageLoader, years: &[Year]) -> Result<OutageCount> {
    let mut total = 0;
    for &year in years {
        total += loader.year_total(year)?;
        info!("Done with year {year}");
    }
    Ok(total)
}

/// Sums the years with one thread per year, reduced at the coordinator.
pub fn threaded_total(
    loader: Arc<OutageLoader>,
    years: &[Year],
    workers: usize,
    timeout: Option<Duration>,
) -> Result<OutageCount> {
    // Refuse before anything is spawned
    check_unit_count(years.len(), workers)?;

    let (coordinator, contributors) = collective(workers, timeout)?;
    let years: Arc<Vec<Year>> = Arc::new(years.to_vec());

    let mut handles: Handles<()> = Handles::new();
    for contributor in contributors {
        let loader = loader.clone();
        let years = years.clone();
        handles.push(spawn(move || {
            let rank = contributor.rank();
            match yearly_partial(&loader, &years, rank, workers) {
                Ok(partial) => contributor.submit_partial(partial),
                Err(err) => contributor.submit_failure(err),
            }
        }));
    }

    let total = coordinator.await_all()?;

    // Every rank has submitted; on an error above the workers stay detached
    for handle in handles {
        let _ = handle.join();
    }

    Ok(total)
}

/// Distinct counties of a year, in the order they first appear.
pub fn county_keys(records: &[OutageRecord]) -> Vec<FipsCode> {
    discover_keys(records.iter().map(|record| &record.fips_code))
}

/// The per-county sums for the counties owned by `rank`.
pub fn county_partial(
    records: &[OutageRecord],
    counties: &[FipsCode],
    rank: Rank,
    size: usize,
    policy: RemainderPolicy,
) -> Result<CountyTable> {
    let local_counties = local_keys(counties, rank, size, policy)?;
    Ok(keyed_sums(
        records.iter().map(|record| (&record.fips_code, record.sum)),
        local_counties,
    ))
}

/// Sums every county in one pass.
pub fn sequential_county_sums(records: &[OutageRecord]) -> CountyTable {
    let counties = county_keys(records);
    keyed_sums(records.iter().map(|record| (&record.fips_code, record.sum)), &counties)
}

fn warn_dropped(counties: &[FipsCode], size: usize, policy: RemainderPolicy) {
    let dropped = dropped_keys(counties.len(), size, policy);
    if !dropped.is_empty() {
        warn!(
            "{} counties do not divide across {size} workers; dropping {:?}",
            counties.len(),
            &counties[dropped]
        );
    }
}

/// Splits the counties into `workers` contiguous ranges, one thread each.
/// Every thread writes its rows into a shared sink; there is no reduction.
pub fn threaded_county_sums(
    records: Arc<Vec<OutageRecord>>,
    workers: usize,
    policy: RemainderPolicy,
) -> Result<CountyTable> {
    let counties: Arc<Vec<FipsCode>> = Arc::new(county_keys(&records));

    // Uneven splits under the default policy fail here, before any thread starts
    key_range(counties.len(), 0, workers, policy)?;
    warn_dropped(&counties, workers, policy);

    let sink = Arc::new(SharedSink::new());

    let mut handles: Handles<Result<()>> = Handles::new();
    for rank in 0..workers {
        let records = records.clone();
        let counties = counties.clone();
        let sink = sink.clone();
        handles.push(spawn(move || {
            let shard = county_partial(&records, &counties, rank, workers, policy)?;
            debug!("rank {rank} summed {} counties", shard.len());
            sink.insert_shard(shard)
        }));
    }

    for (rank, handle) in handles.into_iter().enumerate() {
        handle
            .join()
            .map_err(|_| AggregateError::WorkerPanicked { rank })?
            .map_err(|err| AggregateError::WorkerFailed {
                rank,
                source: Box::new(err),
            })?;
    }

    Ok(sink.to_table(&counties))
}

/// Sums the years with one MPI rank per year. Only the coordinator gets the
/// total back. A rank that fails before the reduction aborts the world.
#[cfg(feature = "multinode")]
pub fn mpi_total(balancer: &Balancer, loader: &OutageLoader, years: &[Year]) -> Option<OutageCount> {
    let partial = balancer.or_abort(yearly_partial(loader, years, balancer.rank, balancer.size));
    balancer.reduce_sum(partial)
}

/// Every rank reads the year, takes its range of counties and writes a part
/// file. After a barrier the coordinator merges the parts into `destination` and
/// gets the merged table back.
#[cfg(feature = "multinode")]
pub fn mpi_county_sums(
    balancer: &Balancer,
    loader: &OutageLoader,
    year: Year,
    policy: RemainderPolicy,
    destination: &Path,
) -> Result<Option<CountyTable>> {
    let parts = output::parts_dir(destination);

    // Keys are discovered redundantly on every rank
    let records = balancer.or_abort(loader.load_year(year));
    let counties = county_keys(&records);
    let shard = balancer.or_abort(county_partial(&records, &counties, balancer.rank, balancer.size, policy));

    if balancer.is_coordinator() {
        warn_dropped(&counties, balancer.size, policy);
        balancer.or_abort(output::clear_parts(&parts));
    }
    balancer.barrier();

    balancer.or_abort(output::write_table(&output::part_path(&parts, balancer.rank), &shard));
    debug!("rank {} wrote {} counties", balancer.rank, shard.len());
    balancer.barrier();

    if !balancer.is_coordinator() {
        return Ok(None);
    }

    let table = output::merge_parts(&parts)?;
    output::write_table(destination, &table)?;
    Ok(Some(table))
}

#[cfg(test)]
use crate::utils::loader::write_year_file;

#[cfg(test)]
fn stage_years(dir: &std::path::Path) -> Vec<Year> {
    // Year i (0-based) sums to i + 1, split over two rows
    let years: Vec<Year> = (2014..=2022).collect();
    for (i, &year) in years.iter().enumerate() {
        let sum = i as OutageCount + 1;
        write_year_file(dir, year, &[(1001, sum - 1), (1003, 1)]);
    }
    years
}

#[cfg(test)]
fn county_records() -> Vec<OutageRecord> {
    // A=1001, B=1003, C=1005, D=1007 with sums 10, 20, 30, 40
    [(1001, 4), (1003, 20), (1001, 6), (1005, 30), (1007, 15), (1007, 25)]
        .iter()
        .map(|&(fips_code, sum)| OutageRecord { fips_code, sum })
        .collect()
}

#[test]
fn test_nine_years_nine_workers() {
    let dir = tempfile::tempdir().unwrap();
    let years = stage_years(dir.path());
    let loader = Arc::new(OutageLoader::new(dir.path()));

    let total = threaded_total(loader, &years, 9, Some(Duration::from_secs(30))).unwrap();
    assert_eq!(total, 45);
}

#[test]
fn test_threaded_total_matches_sequential_and_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let years = stage_years(dir.path());
    let loader = Arc::new(OutageLoader::new(dir.path()));

    let sequential = sequential_total(&loader, &years).unwrap();
    let first = threaded_total(loader.clone(), &years, years.len(), None).unwrap();
    let second = threaded_total(loader, &years, years.len(), None).unwrap();
    assert_eq!(sequential, 45);
    assert_eq!(first, sequential);
    assert_eq!(second, first);
}

#[test]
fn test_threaded_total_rejects_worker_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let years = stage_years(dir.path());
    let loader = Arc::new(OutageLoader::new(dir.path()));

    assert!(matches!(
        threaded_total(loader.clone(), &years, 8, None),
        Err(AggregateError::ShardAssignment { units: 9, size: 8 })
    ));
    assert!(matches!(
        threaded_total(loader, &years, 10, None),
        Err(AggregateError::ShardAssignment { units: 9, size: 10 })
    ));
}

#[test]
fn test_threaded_total_missing_year_fails_without_hanging() {
    let dir = tempfile::tempdir().unwrap();
    let mut years = stage_years(dir.path());
    years.push(2031);
    let loader = Arc::new(OutageLoader::new(dir.path()));

    match threaded_total(loader, &years, years.len(), Some(Duration::from_secs(30))) {
        Err(AggregateError::WorkerFailed { rank, source }) => {
            assert_eq!(rank, 9);
            assert!(matches!(*source, AggregateError::Input { .. }));
        }
        other => panic!("expected WorkerFailed, got {other:?}"),
    }
}

#[test]
fn test_single_worker_equals_sequential() {
    let dir = tempfile::tempdir().unwrap();
    write_year_file(dir.path(), 2014, &[(1001, 3), (1003, 4)]);
    let loader = Arc::new(OutageLoader::new(dir.path()));

    assert_eq!(threaded_total(loader.clone(), &[2014], 1, None).unwrap(), 7);
    assert_eq!(sequential_total(&loader, &[2014]).unwrap(), 7);

    let records = Arc::new(loader.load_year(2014).unwrap());
    assert_eq!(
        threaded_county_sums(records.clone(), 1, RemainderPolicy::Fail).unwrap(),
        sequential_county_sums(&records)
    );
}

#[test]
fn test_two_workers_split_counties_in_half() {
    let records = county_records();
    let counties = county_keys(&records);
    assert_eq!(counties, vec![1001, 1003, 1005, 1007]);

    let first = county_partial(&records, &counties, 0, 2, RemainderPolicy::Fail).unwrap();
    let second = county_partial(&records, &counties, 1, 2, RemainderPolicy::Fail).unwrap();
    assert_eq!(first, vec![(1001, 10), (1003, 20)]);
    assert_eq!(second, vec![(1005, 30), (1007, 40)]);

    let merged = threaded_county_sums(Arc::new(records), 2, RemainderPolicy::Fail).unwrap();
    assert_eq!(merged, vec![(1001, 10), (1003, 20), (1005, 30), (1007, 40)]);
}

#[test]
fn test_three_workers_drop_last_county() {
    let records = county_records();
    let counties = county_keys(&records);

    let shards: Vec<CountyTable> = (0..3)
        .map(|rank| county_partial(&records, &counties, rank, 3, RemainderPolicy::Drop).unwrap())
        .collect();
    assert_eq!(shards, vec![vec![(1001, 10)], vec![(1003, 20)], vec![(1005, 30)]]);

    let merged = threaded_county_sums(Arc::new(records), 3, RemainderPolicy::Drop).unwrap();
    assert_eq!(merged, vec![(1001, 10), (1003, 20), (1005, 30)]);
}

#[test]
fn test_three_workers_fail_or_redistribute() {
    let records = Arc::new(county_records());

    assert!(matches!(
        threaded_county_sums(records.clone(), 3, RemainderPolicy::Fail),
        Err(AggregateError::UnevenKeys { keys: 4, size: 3 })
    ));
    assert_eq!(
        threaded_county_sums(records.clone(), 3, RemainderPolicy::Redistribute).unwrap(),
        sequential_county_sums(&records)
    );
}

#[test]
fn test_even_partitions_sum_to_dataset_total() {
    // 12 counties, each with a few rows
    let records: Vec<OutageRecord> = (0..36)
        .map(|i| OutageRecord {
            fips_code: 1001 + (i % 12) as FipsCode * 2,
            sum: (i * 7 % 11) as OutageCount,
        })
        .collect();
    let dataset_total: OutageCount = records.iter().map(|record| record.sum).sum();
    let sequential = sequential_county_sums(&records);
    let records = Arc::new(records);

    for workers in [1, 2, 3, 4, 6, 12] {
        let merged = threaded_county_sums(records.clone(), workers, RemainderPolicy::Fail).unwrap();
        assert_eq!(merged, sequential, "{workers} workers");
        assert_eq!(merged.iter().map(|(_, sum)| sum).sum::<OutageCount>(), dataset_total);
    }
}
