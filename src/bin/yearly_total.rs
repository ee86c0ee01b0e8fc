//! Total outages over a set of years, one worker per yearly file.
use anyhow::Result;
use clap::Parser;
use eaglei_analysis::config::{Launcher, YearlyTotalCli};
use eaglei_analysis::outages;
use log::info;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "multinode")]
use eaglei_analysis::utils::balancer::Balancer;
#[cfg(feature = "multinode")]
use log::warn;

fn main() -> Result<()> {
    let cli = YearlyTotalCli::parse();
    cli.common.init_logging();

    let loader = cli.common.loader();
    let years = cli.years(&loader)?;
    info!("Summing {} years from {}", years.len(), loader.data_dir.display());

    let now = Instant::now();

    // Only the coordinator gets a total back
    let total = match cli.common.launcher {
        Launcher::Sequential => Some(outages::sequential_total(&loader, &years)?),
        Launcher::Threads => {
            let workers = cli.common.workers.unwrap_or(years.len());
            Some(outages::threaded_total(
                Arc::new(loader),
                &years,
                workers,
                cli.common.timeout(),
            )?)
        }
        #[cfg(feature = "multinode")]
        Launcher::Mpi => {
            let balancer = Balancer::new()?;
            if cli.common.workers.is_some_and(|workers| workers != balancer.size) {
                warn!("--workers is ignored under MPI; using {} ranks", balancer.size);
            }
            outages::mpi_total(&balancer, &loader, &years)
        }
        #[cfg(not(feature = "multinode"))]
        Launcher::Mpi => anyhow::bail!("built without MPI support; rebuild with `--features multinode`"),
    };

    if let Some(total) = total {
        println!("The total time of the script was: {} seconds", now.elapsed().as_secs_f64());
        match (years.first(), years.last()) {
            (Some(first), Some(last)) => println!("The total blackouts from {first}-{last}: {total}"),
            _ => println!("The total blackouts: {total}"),
        }
    }

    Ok(())
}
