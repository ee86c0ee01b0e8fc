//! An all-to-one sum over threads. Every rank gets a [`Contributor`] that it
//! hands its partial to exactly once, and the coordinator holds the single
//! [`Coordinator`] that waits for all of them.
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use num_traits::Zero;
use std::time::{Duration, Instant};

use crate::error::{AggregateError, Result};
use crate::Rank;

type Message<T> = (Rank, Result<T>);

pub struct Contributor<T> {
    rank: Rank,
    sender: Sender<Message<T>>,
}

pub struct Coordinator<T> {
    size: usize,
    timeout: Option<Duration>,
    receiver: Receiver<Message<T>>,
}

/// Builds the coordinator and one contributor per rank, in rank order.
pub fn collective<T>(size: usize, timeout: Option<Duration>) -> Result<(Coordinator<T>, Vec<Contributor<T>>)> {
    if size == 0 {
        return Err(AggregateError::NoWorkers);
    }

    let (sender, receiver) = unbounded();
    let contributors = (0..size)
        .map(|rank| Contributor {
            rank,
            sender: sender.clone(),
        })
        .collect();

    Ok((
        Coordinator {
            size,
            timeout,
            receiver,
        },
        contributors,
    ))
}

impl<T> Contributor<T> {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Hands this rank's partial aggregate to the coordinator.
    pub fn submit_partial(self, partial: T) {
        self.send(Ok(partial))
    }

    /// Reports that this rank could not produce a partial.
    pub fn submit_failure(self, err: AggregateError) {
        self.send(Err(err))
    }

    fn send(self, message: Result<T>) {
        // The coordinator is gone once it has timed out or seen a failure
        if self.sender.send((self.rank, message)).is_err() {
            debug!("rank {} submitted after the coordinator stopped listening", self.rank);
        }
    }
}

impl<T> Coordinator<T> {
    pub fn size(&self) -> usize {
        self.size
    }

    /// Waits for every rank and returns the partials in rank order.
    pub fn await_partials(self) -> Result<Vec<T>> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut partials: Vec<Option<T>> = (0..self.size).map(|_| None).collect();
        let mut received = 0;

        while received < self.size {
            let message = match deadline {
                Some(deadline) => self
                    .receiver
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok((rank, Ok(partial))) => {
                    debug!("received partial from rank {rank}");
                    partials[rank] = Some(partial);
                    received += 1;
                }
                Ok((rank, Err(err))) => {
                    return Err(AggregateError::WorkerFailed {
                        rank,
                        source: Box::new(err),
                    })
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("gave up on the collective with {received} of {} partials", self.size);
                    return Err(AggregateError::ReductionTimeout {
                        // Only reachable with a deadline
                        timeout: self.timeout.unwrap_or_default(),
                        received,
                        expected: self.size,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let missing = partials
                        .iter()
                        .enumerate()
                        .filter(|(_, partial)| partial.is_none())
                        .map(|(rank, _)| rank)
                        .collect();
                    return Err(AggregateError::WorkerLost { missing });
                }
            }
        }

        Ok(partials.into_iter().flatten().collect())
    }
}

impl<T: Zero> Coordinator<T> {
    /// Waits for every rank and sums their partials.
    pub fn await_all(self) -> Result<T> {
        Ok(self
            .await_partials()?
            .into_iter()
            .fold(T::zero(), |acc, x| acc + x))
    }
}

#[test]
fn test_sum_across_threads() {
    let (coordinator, contributors) = collective::<i64>(9, Some(Duration::from_secs(10))).unwrap();
    let handles: Vec<_> = contributors
        .into_iter()
        .map(|contributor| {
            std::thread::spawn(move || {
                let partial = contributor.rank() as i64 + 1;
                contributor.submit_partial(partial)
            })
        })
        .collect();

    assert_eq!(coordinator.await_all().unwrap(), 45);
    handles.into_iter().for_each(|handle| handle.join().unwrap());
}

#[test]
fn test_partials_come_back_in_rank_order() {
    let (coordinator, contributors) = collective::<usize>(4, None).unwrap();
    for contributor in contributors.into_iter().rev() {
        let rank = contributor.rank();
        contributor.submit_partial(rank * 10);
    }
    assert_eq!(coordinator.await_partials().unwrap(), vec![0, 10, 20, 30]);
}

#[test]
fn test_failure_is_reported_with_rank() {
    let (coordinator, mut contributors) = collective::<i64>(2, None).unwrap();
    let second = contributors.pop().unwrap();
    let first = contributors.pop().unwrap();
    first.submit_partial(1);
    second.submit_failure(AggregateError::NoInputs("nothing".to_string()));

    assert!(matches!(
        coordinator.await_all(),
        Err(AggregateError::WorkerFailed { rank: 1, .. })
    ));
}

#[test]
fn test_dropped_contributor_does_not_hang() {
    let (coordinator, mut contributors) = collective::<i64>(3, None).unwrap();
    let last = contributors.pop().unwrap();
    last.submit_partial(3);
    drop(contributors);

    match coordinator.await_all() {
        Err(AggregateError::WorkerLost { missing }) => assert_eq!(missing, vec![0, 1]),
        other => panic!("expected WorkerLost, got {other:?}"),
    }
}

#[test]
fn test_silent_worker_times_out() {
    let (coordinator, contributors) = collective::<i64>(2, Some(Duration::from_millis(50))).unwrap();
    let mut contributors = contributors.into_iter();
    contributors.next().unwrap().submit_partial(7);
    // Rank 1 stays alive without ever submitting
    let _silent = contributors.next().unwrap();

    assert!(matches!(
        coordinator.await_all(),
        Err(AggregateError::ReductionTimeout {
            received: 1,
            expected: 2,
            ..
        })
    ));
}

#[test]
fn test_zero_workers_rejected() {
    assert!(matches!(collective::<i64>(0, None), Err(AggregateError::NoWorkers)));
}
