//! Error type shared by the loader, the partitioner and the collectives

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::Rank;

pub type Result<T> = std::result::Result<T, AggregateError>;

#[derive(Error, Debug)]
pub enum AggregateError {
    /// Zero workers were requested
    #[error("at least one worker is required")]
    NoWorkers,

    /// A worker index outside `[0, size)`
    #[error("rank {rank} is out of range for {size} workers")]
    RankOutOfRange { rank: Rank, size: usize },

    /// Unit-of-file partitioning needs exactly one worker per unit
    #[error("{units} input units cannot be assigned to {size} workers; run with exactly one worker per unit")]
    ShardAssignment { units: usize, size: usize },

    /// Key count not divisible by worker count and no remainder policy chosen
    #[error("{keys} keys do not divide evenly across {size} workers; pick a remainder policy (drop or redistribute)")]
    UnevenKeys { keys: usize, size: usize },

    #[error("failed to read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no input files matched {0}")]
    NoInputs(String),

    /// The coordinator gave up waiting on the collective
    #[error("collective did not complete within {timeout:?} ({received} of {expected} partials received)")]
    ReductionTimeout {
        timeout: Duration,
        received: usize,
        expected: usize,
    },

    /// Every contributor hung up before the listed ranks submitted
    #[error("workers {missing:?} exited without submitting a partial")]
    WorkerLost { missing: Vec<Rank> },

    #[error("worker {rank} failed: {source}")]
    WorkerFailed {
        rank: Rank,
        #[source]
        source: Box<AggregateError>,
    },

    #[error("worker {rank} panicked")]
    WorkerPanicked { rank: Rank },

    #[error("key {0} was produced by more than one shard")]
    OverlappingShards(String),

    #[error("MPI could not be initialized")]
    MpiUnavailable,
}
