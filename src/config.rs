//! Command line arguments shared by the binaries
use clap::{Args, Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::error::Result;
use crate::utils::loader::OutageLoader;
use crate::utils::partition::RemainderPolicy;
use crate::Year;

/// How the workers are started
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Launcher {
    /// No partitioning, everything on the calling thread
    Sequential,
    /// One thread per worker in this process
    Threads,
    /// One MPI rank per worker (launch with `mpirun -np <workers>`; needs the
    /// `multinode` feature)
    Mpi,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Directory holding the eaglei_outages_<year>.csv files
    #[arg(long, env = "EAGLEI_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long, value_enum, default_value = "threads")]
    pub launcher: Launcher,

    /// Number of workers (threads launcher only; MPI uses the world size)
    #[arg(short = 'n', long)]
    pub workers: Option<usize>,

    /// Seconds to wait on the collective before giving up (0 waits forever)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    #[arg(long, default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,
}

fn parse_level(level: &str) -> std::result::Result<LevelFilter, String> {
    level
        .parse()
        .map_err(|_| format!("unknown log level `{level}`"))
}

impl CommonArgs {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn loader(&self) -> OutageLoader {
        OutageLoader::new(&self.data_dir)
    }

    /// `RUST_LOG` still wins over `--log-level`.
    pub fn init_logging(&self) {
        env_logger::builder()
            .filter_level(self.log_level)
            .parse_default_env()
            .init();
    }
}

/// Sum every outage over a set of years
#[derive(Parser, Debug)]
#[command(name = "yearly_total", version, about)]
pub struct YearlyTotalCli {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Comma-separated years to sum (defaults to 2014-2022)
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<Year>,

    /// Use every year found in the data directory
    #[arg(long, conflicts_with = "years")]
    pub discover: bool,
}

impl YearlyTotalCli {
    pub fn years(&self, loader: &OutageLoader) -> Result<Vec<Year>> {
        if self.discover {
            loader.available_years()
        } else if self.years.is_empty() {
            Ok(YEARS.to_vec())
        } else {
            Ok(self.years.clone())
        }
    }
}

/// Sum outages per county (FIPS code) for a single year
#[derive(Parser, Debug)]
#[command(name = "county_sums", version, about)]
pub struct CountySumsCli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value_t = DEFAULT_COUNTY_YEAR)]
    pub year: Year,

    /// What to do with counties left over when they don't divide evenly
    #[arg(long, value_enum, default_value = "fail")]
    pub remainder: RemainderPolicy,

    /// Where to write the county table
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,
}

#[test]
fn test_yearly_defaults() {
    let cli = YearlyTotalCli::parse_from(["yearly_total"]);
    assert_eq!(cli.common.launcher, Launcher::Threads);
    assert_eq!(cli.common.timeout(), Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
    assert_eq!(cli.years(&cli.common.loader()).unwrap(), YEARS.to_vec());
}

#[test]
fn test_yearly_explicit_years() {
    let cli = YearlyTotalCli::parse_from([
        "yearly_total",
        "--years",
        "2016,2014",
        "--launcher",
        "sequential",
        "--timeout",
        "0",
    ]);
    assert_eq!(cli.common.launcher, Launcher::Sequential);
    assert_eq!(cli.common.timeout(), None);
    assert_eq!(cli.years(&cli.common.loader()).unwrap(), vec![2016, 2014]);
}

#[test]
fn test_county_defaults_fail_on_remainder() {
    let cli = CountySumsCli::parse_from(["county_sums", "-n", "3"]);
    assert_eq!(cli.year, DEFAULT_COUNTY_YEAR);
    assert_eq!(cli.remainder, RemainderPolicy::Fail);
    assert_eq!(cli.common.workers, Some(3));
    assert_eq!(cli.output, PathBuf::from(DEFAULT_OUTPUT));
}

#[test]
fn test_county_remainder_policy_parses() {
    let cli = CountySumsCli::parse_from(["county_sums", "--remainder", "redistribute", "--year", "2020"]);
    assert_eq!(cli.remainder, RemainderPolicy::Redistribute);
    assert_eq!(cli.year, 2020);
}

#[test]
fn test_log_level_parses() {
    let cli = CountySumsCli::parse_from(["county_sums", "--log-level", "debug"]);
    assert_eq!(cli.common.log_level, LevelFilter::Debug);
    assert!(CountySumsCli::try_parse_from(["county_sums", "--log-level", "chatty"]).is_err());
}
