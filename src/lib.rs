pub mod aggregate;
pub mod config;
pub mod constants;
pub mod error;
pub mod outages;
pub mod utils;

// These have to agree between the loader, the aggregation kernels and the
// county table written at the end of a run.
pub type Year = usize;
pub type FipsCode = u32;
pub type OutageCount = i64;
pub type Rank = usize;
