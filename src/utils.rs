pub mod collective;
pub mod loader;
pub mod output;
pub mod partition;

#[cfg(feature = "multinode")]
pub mod balancer;

use std::thread::JoinHandle;

pub type Handles<T> = Vec<JoinHandle<T>>;
