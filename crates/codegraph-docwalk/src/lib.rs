//! Bottom-up concurrent documentation walk over a CodeGraph source graph.
//!
//! [`BottomUpWalker::process`] documents a root node after all of its
//! dependents, using a bounded pool of workers. Call-graph recursion is cut
//! per worker, cross-worker wait cycles are refused by the dependency
//! tracker, and waits that would deadlock or time out resolve to degraded
//! fallback artifacts, so every run terminates with an artifact per reached
//! node.

pub mod dispatch;
pub mod fallback;
mod generate;
pub mod navigation;
pub mod pool;
pub mod telemetry;
pub mod walker;
pub mod worker;

pub use dispatch::{Dispatch, DispatchPolicy};
pub use fallback::FallbackComputer;
pub use navigation::{Navigation, NavigationKind, NavigationResolver};
pub use pool::{WorkerPool, WorkerSlot};
pub use telemetry::init_tracing;
pub use walker::{BottomUpWalker, RunResult, RunStats};
pub use worker::WorkerContext;
