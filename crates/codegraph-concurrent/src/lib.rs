//! Concurrent building blocks for the CodeGraph documentation walk
//!
//! - `station`: per-node single-flight admission with result broadcast
//! - `dependency`: worker wait-for graph that refuses deadlocking waits
//! - `graph`: lock-free in-memory source graph (ArcSwap + SkipMap)

pub mod dependency;
pub mod graph;
pub mod station;

pub use dependency::{ProcessorGuard, WaitGuard, WorkerDependencyTracker, WorkerId};
pub use graph::LockFreeAdjacencyGraph;
pub use station::{Admission, NodeStations, OwnerHandle, StationHandle, StationValue, WaitError};
