//! Outage sums per county for one year, written out as a two column table.
use anyhow::Result;
use clap::Parser;
use eaglei_analysis::config::{CountySumsCli, Launcher};
use eaglei_analysis::outages;
use eaglei_analysis::utils::output::write_table;
use log::info;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "multinode")]
use eaglei_analysis::utils::balancer::Balancer;

fn main() -> Result<()> {
    let cli = CountySumsCli::parse();
    cli.common.init_logging();

    let loader = cli.common.loader();
    let now = Instant::now();

    let table = match cli.common.launcher {
        Launcher::Sequential => {
            let records = loader.load_year(cli.year)?;
            let table = outages::sequential_county_sums(&records);
            write_table(&cli.output, &table)?;
            Some(table)
        }
        Launcher::Threads => {
            let workers = match cli.common.workers {
                Some(workers) => workers,
                None => std::thread::available_parallelism()?.get(),
            };
            let records = Arc::new(loader.load_year(cli.year)?);
            let table = outages::threaded_county_sums(records, workers, cli.remainder)?;
            write_table(&cli.output, &table)?;
            Some(table)
        }
        #[cfg(feature = "multinode")]
        Launcher::Mpi => {
            let balancer = Balancer::new()?;
            outages::mpi_county_sums(&balancer, &loader, cli.year, cli.remainder, &cli.output)?
        }
        #[cfg(not(feature = "multinode"))]
        Launcher::Mpi => anyhow::bail!("built without MPI support; rebuild with `--features multinode`"),
    };

    if let Some(table) = table {
        info!("Wrote {} counties for {} to {}", table.len(), cli.year, cli.output.display());
        println!("Total time of script {}", now.elapsed().as_secs_f64());
    }

    Ok(())
}
