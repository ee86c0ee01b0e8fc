use log::{error, info};
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::{Communicator, SystemCommunicator};
use mpi::traits::*;
use num_traits::Zero;

use crate::constants::COORDINATOR;
use crate::error::{AggregateError, Result};
use crate::Rank;

/// Gives a process its place in the MPI world and the collectives it needs.
pub struct Balancer {
    pub world: SystemCommunicator,
    pub rank: Rank,
    pub size: usize,
    // Finalizes MPI on drop, so it has to outlive `world`
    _universe: Universe,
}

impl Balancer {
    /// Initializes MPI. Fails if it was already initialized in this process.
    pub fn new() -> Result<Self> {
        let universe = mpi::initialize().ok_or(AggregateError::MpiUnavailable)?;
        let world = universe.world();

        // This is the node id and total number of nodes
        let rank: Rank = world.rank() as Rank;
        let size: usize = world.size() as usize;

        if rank == COORDINATOR {
            info!("--------- Balancer Activated ---------");
            info!("            Ranks : {size}");
            info!("--------------------------------------");
        }

        Ok(Balancer {
            world,
            rank,
            size,
            _universe: universe,
        })
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR
    }

    /// Sums `partial` over all ranks into the coordinator, which gets
    /// `Some(total)`. Every other rank gets `None`. Blocks until all ranks
    /// have contributed.
    pub fn reduce_sum<T: Equivalence + Zero>(&self, partial: T) -> Option<T> {
        let root = self.world.process_at_rank(COORDINATOR as i32);
        if self.is_coordinator() {
            let mut total = T::zero();
            root.reduce_into_root(&partial, &mut total, SystemOperation::sum());
            Some(total)
        } else {
            root.reduce_into(&partial, SystemOperation::sum());
            None
        }
    }

    /// Waits for all ranks to reach this point.
    pub fn barrier(&self) {
        self.world.barrier();
    }

    /// Tears down every rank. Used when this rank cannot reach a collective,
    /// since peers would otherwise wait on it forever.
    pub fn abort(&self, err: &AggregateError) -> ! {
        error!("rank {} aborting: {err}", self.rank);
        self.world.abort(1)
    }

    /// Unwraps `result`, or aborts the whole world on error.
    pub fn or_abort<T>(&self, result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => self.abort(&err),
        }
    }
}
