use glob::glob;
use log::{debug, info};
use serde_derive::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::constants::FILE_PREFIX;
use crate::error::{AggregateError, Result};
use crate::{FipsCode, OutageCount, Year};

/// One row of a yearly outage file. Only the columns that get aggregated are
/// kept; county name, state and timestamps are skipped by the deserializer.
#[derive(Debug, Deserialize, PartialEq, Copy, Clone)]
pub struct OutageRecord {
    pub fips_code: FipsCode,
    pub sum: OutageCount,
}

pub struct OutageLoader {
    pub data_dir: PathBuf,
}

impl OutageLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        OutageLoader {
            data_dir: data_dir.into(),
        }
    }

    /// Location of the csv file for `year`.
    pub fn path_for_year(&self, year: Year) -> PathBuf {
        self.data_dir.join(format!("{FILE_PREFIX}{year}.csv"))
    }

    fn reader(&self, year: Year) -> Result<(PathBuf, csv::Reader<File>)> {
        let path = self.path_for_year(year);
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|source| AggregateError::Input {
                path: path.clone(),
                source,
            })?;
        Ok((path, reader))
    }

    /// Reads every record for `year` into memory.
    pub fn load_year(&self, year: Year) -> Result<Vec<OutageRecord>> {
        let (path, mut reader) = self.reader(year)?;

        let records = reader
            .deserialize::<OutageRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|source| AggregateError::Input { path: path.clone(), source })?;

        debug!("loaded {} records from {}", records.len(), path.display());
        Ok(records)
    }

    /// Sums the outage column for `year` without holding on to the rows.
    pub fn year_total(&self, year: Year) -> Result<OutageCount> {
        let (path, mut reader) = self.reader(year)?;

        let mut total: OutageCount = 0;
        for row in reader.deserialize::<OutageRecord>() {
            let record = row.map_err(|source| AggregateError::Input {
                path: path.clone(),
                source,
            })?;
            total += record.sum;
        }

        Ok(total)
    }

    /// Finds every year that has a file in the data directory.
    pub fn available_years(&self) -> Result<Vec<Year>> {
        let pattern = self
            .data_dir
            .join(format!("{FILE_PREFIX}*.csv"))
            .display()
            .to_string();

        let mut years = vec![];
        for entry in glob(&pattern)? {
            let path = entry.map_err(|err| err.into_error())?;
            if let Some(year) = year_from_path(&path) {
                years.push(year);
            }
        }

        if years.is_empty() {
            return Err(AggregateError::NoInputs(pattern));
        }

        years.sort_unstable();
        info!("Found {} years of data in {}", years.len(), self.data_dir.display());
        Ok(years)
    }
}

fn year_from_path(path: &Path) -> Option<Year> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(FILE_PREFIX)?
        .parse()
        .ok()
}

/// Writes a yearly file in the layout of the real dataset.
#[cfg(test)]
pub(crate) fn write_year_file(dir: &Path, year: Year, rows: &[(FipsCode, OutageCount)]) {
    let loader = OutageLoader::new(dir);
    let mut writer = csv::Writer::from_path(loader.path_for_year(year)).unwrap();
    writer
        .write_record(["fips_code", "county", "state", "sum", "run_start_time"])
        .unwrap();
    for (fips_code, sum) in rows {
        writer
            .write_record([
                fips_code.to_string(),
                "Some County".to_string(),
                "Some State".to_string(),
                sum.to_string(),
                format!("{year}-01-01 00:00:00"),
            ])
            .unwrap();
    }
    writer.flush().unwrap();
}

#[test]
fn test_load_year_ignores_extra_columns() {
    let dir = tempfile::tempdir().unwrap();
    write_year_file(dir.path(), 2014, &[(1001, 5), (1003, 7), (1001, 2)]);

    let loader = OutageLoader::new(dir.path());
    let records = loader.load_year(2014).unwrap();
    assert_eq!(
        records,
        vec![
            OutageRecord { fips_code: 1001, sum: 5 },
            OutageRecord { fips_code: 1003, sum: 7 },
            OutageRecord { fips_code: 1001, sum: 2 },
        ]
    );
    assert_eq!(loader.year_total(2014).unwrap(), 14);
}

#[test]
fn test_missing_year_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let loader = OutageLoader::new(dir.path());
    match loader.year_total(2030) {
        Err(AggregateError::Input { path, .. }) => assert_eq!(path, loader.path_for_year(2030)),
        other => panic!("expected Input error, got {other:?}"),
    }
}

#[test]
fn test_malformed_row_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let loader = OutageLoader::new(dir.path());
    std::fs::write(loader.path_for_year(2015), "fips_code,sum\n1001,lots\n").unwrap();
    assert!(matches!(loader.load_year(2015), Err(AggregateError::Input { .. })));
}

#[test]
fn test_available_years_sorted() {
    let dir = tempfile::tempdir().unwrap();
    for year in [2016, 2014, 2015] {
        write_year_file(dir.path(), year, &[(1001, 1)]);
    }
    std::fs::write(dir.path().join("notes.csv"), "x\n").unwrap();

    let loader = OutageLoader::new(dir.path());
    assert_eq!(loader.available_years().unwrap(), vec![2014, 2015, 2016]);
}

#[test]
fn test_available_years_empty_dir() {
    let dir = tempfile::tempdir().unwrap();
    let loader = OutageLoader::new(dir.path());
    assert!(matches!(loader.available_years(), Err(AggregateError::NoInputs(_))));
}
