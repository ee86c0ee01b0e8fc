use crate::{Rank, Year};

/// Years for which there is outage data, one file per year
pub const YEARS: [Year; 9] = [2014, 2015, 2016, 2017, 2018, 2019, 2020, 2021, 2022];

/// Default location of the yearly csv files
pub const DEFAULT_DATA_DIR: &str = "../data/eaglei_outages";

/// Yearly files are named `{FILE_PREFIX}{year}.csv`
pub const FILE_PREFIX: &str = "eaglei_outages_";

/// Year used for the per-county breakdown unless told otherwise (2152 counties)
pub const DEFAULT_COUNTY_YEAR: Year = 2014;

/// Where the per-county table ends up
pub const DEFAULT_OUTPUT: &str = "county_blackouts.csv";

/// Per-rank part files are named `{PART_PREFIX}{rank:04}.csv`
pub const PART_PREFIX: &str = "county_blackouts_rank";

/// Header of the county table
pub const FIPS_HEADER: &str = "FIPS Code";
pub const SUM_HEADER: &str = "Blackout Sum";

/// Rank that receives the reduced total
pub const COORDINATOR: Rank = 0;

/// Seconds the coordinator waits for partials before giving up
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
