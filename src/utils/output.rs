//! Writing and reading back the per-county table.
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use glob::glob;
use log::debug;
use serde_derive::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregate::merge_disjoint;
use crate::constants::{FIPS_HEADER, PART_PREFIX, SUM_HEADER};
use crate::error::{AggregateError, Result};
use crate::{FipsCode, OutageCount, Rank};

/// Per-county sums, in key-discovery order
pub type CountyTable = Vec<(FipsCode, OutageCount)>;

#[derive(Debug, Deserialize, PartialEq)]
struct CountyRow {
    #[serde(rename = "FIPS Code")]
    fips_code: FipsCode,
    #[serde(rename = "Blackout Sum")]
    blackout_sum: OutageCount,
}

/// Writes `table` with a single header row. An empty table still gets its
/// header so every part file parses the same way.
pub fn write_table(path: &Path, table: &[(FipsCode, OutageCount)]) -> Result<()> {
    let output_err = |source| AggregateError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(output_err)?;

    writer.write_record([FIPS_HEADER, SUM_HEADER]).map_err(output_err)?;
    for (fips_code, sum) in table {
        writer
            .write_record([fips_code.to_string(), sum.to_string()])
            .map_err(output_err)?;
    }
    writer.flush()?;

    debug!("wrote {} counties to {}", table.len(), path.display());
    Ok(())
}

pub fn read_table(path: &Path) -> Result<CountyTable> {
    let input_err = |source| AggregateError::Input {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(input_err)?;
    reader
        .deserialize::<CountyRow>()
        .map(|row| {
            row.map(|row| (row.fips_code, row.blackout_sum))
                .map_err(input_err)
        })
        .collect()
}

/// Directory that holds the per-rank part files for `output`.
pub fn parts_dir(output: &Path) -> PathBuf {
    output.with_extension("parts")
}

pub fn part_path(dir: &Path, rank: Rank) -> PathBuf {
    dir.join(format!("{PART_PREFIX}{rank:04}.csv"))
}

fn part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(format!("{PART_PREFIX}*.csv")).display().to_string();
    let mut paths = vec![];
    for entry in glob(&pattern)? {
        paths.push(entry.map_err(|err| err.into_error())?);
    }
    paths.sort();
    Ok(paths)
}

/// Removes part files left behind by an earlier run.
pub fn clear_parts(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for path in part_files(dir)? {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Reads every part file in rank order and merges them into one table.
pub fn merge_parts(dir: &Path) -> Result<CountyTable> {
    let paths = part_files(dir)?;
    if paths.is_empty() {
        return Err(AggregateError::NoInputs(dir.display().to_string()));
    }

    let partials = paths
        .iter()
        .map(|path| read_table(path))
        .collect::<Result<Vec<_>>>()?;
    merge_disjoint(partials)
}

/// Destination shared by in-process workers. Workers own disjoint counties,
/// so the only thing checked on insert is that no county arrives twice.
#[derive(Default)]
pub struct SharedSink {
    rows: DashMap<FipsCode, OutageCount>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_shard(&self, shard: CountyTable) -> Result<()> {
        for (fips_code, sum) in shard {
            match self.rows.entry(fips_code) {
                Entry::Occupied(_) => {
                    return Err(AggregateError::OverlappingShards(fips_code.to_string()))
                }
                Entry::Vacant(entry) => {
                    entry.insert(sum);
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Lays the collected rows out in `order`. Counties no worker wrote
    /// (dropped keys) are left out.
    pub fn to_table(&self, order: &[FipsCode]) -> CountyTable {
        order
            .iter()
            .filter_map(|fips_code| self.rows.get(fips_code).map(|sum| (*fips_code, *sum)))
            .collect()
    }
}

#[test]
fn test_table_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("county_blackouts.csv");
    let table = vec![(1001, 10), (1003, 20), (1005, 0)];

    write_table(&path, &table).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "FIPS Code,Blackout Sum\n1001,10\n1003,20\n1005,0\n"
    );
    assert_eq!(read_table(&path).unwrap(), table);
}

#[test]
fn test_empty_table_keeps_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = part_path(dir.path(), 3);
    write_table(&path, &[]).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "FIPS Code,Blackout Sum\n");
    assert!(read_table(&path).unwrap().is_empty());
}

#[test]
fn test_merge_parts_in_rank_order() {
    let dir = tempfile::tempdir().unwrap();
    // Written out of order on purpose
    write_table(&part_path(dir.path(), 1), &[(1005, 30), (1007, 40)]).unwrap();
    write_table(&part_path(dir.path(), 0), &[(1001, 10), (1003, 20)]).unwrap();

    assert_eq!(
        merge_parts(dir.path()).unwrap(),
        vec![(1001, 10), (1003, 20), (1005, 30), (1007, 40)]
    );
}

#[test]
fn test_clear_parts_removes_stale_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let parts = parts_dir(&dir.path().join("county_blackouts.csv"));
    clear_parts(&parts).unwrap();
    write_table(&part_path(&parts, 7), &[(1001, 1)]).unwrap();

    clear_parts(&parts).unwrap();
    assert!(matches!(merge_parts(&parts), Err(AggregateError::NoInputs(_))));
}

#[test]
fn test_shared_sink_rejects_repeated_county() {
    let sink = SharedSink::new();
    sink.insert_shard(vec![(1001, 10), (1003, 20)]).unwrap();
    assert!(matches!(
        sink.insert_shard(vec![(1003, 1)]),
        Err(AggregateError::OverlappingShards(key)) if key == "1003"
    ));
}

#[test]
fn test_shared_sink_follows_discovery_order() {
    let sink = SharedSink::new();
    sink.insert_shard(vec![(1005, 30)]).unwrap();
    sink.insert_shard(vec![(1001, 10), (1003, 20)]).unwrap();
    assert_eq!(sink.len(), 3);
    assert_eq!(sink.to_table(&[1001, 1003, 1005, 1007]), vec![(1001, 10), (1003, 20), (1005, 30)]);
}
