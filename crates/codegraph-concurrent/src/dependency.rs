//! Worker-level wait-for graph used to refuse waits that would deadlock.
//!
//! Two relations are tracked under one lock:
//! - `processing`: node -> worker currently computing it
//! - `waiting_for`: worker -> nodes it is blocked on
//!
//! A wait edge is only inserted when following `waiting_for` / `processing`
//! from the node's owner cannot lead back to the requesting worker. Check and
//! insert happen in the same critical section.

use codegraph_core::NodeId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a worker task, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn next() -> Self {
        WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    processing: HashMap<NodeId, WorkerId>,
    // Counted so that two independent waits on the same node by one worker
    // (a join and a station wait) release independently.
    waiting_for: HashMap<WorkerId, HashMap<NodeId, usize>>,
}

impl TrackerState {
    /// True if `worker` waiting on `node` would close a cycle.
    fn would_deadlock(&self, node: &NodeId, worker: WorkerId) -> bool {
        let Some(&owner) = self.processing.get(node) else {
            return false;
        };

        let mut stack = vec![owner];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == worker {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(waits) = self.waiting_for.get(&current) {
                for waited in waits.keys() {
                    if let Some(&next) = self.processing.get(waited) {
                        if !visited.contains(&next) {
                            stack.push(next);
                        }
                    }
                }
            }
        }
        false
    }
}

/// Tracks which worker owns which node and which worker waits on which node.
#[derive(Debug, Default)]
pub struct WorkerDependencyTracker {
    state: Mutex<TrackerState>,
}

impl WorkerDependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `worker` as the owner of `node`. Idempotent; the first owner stays.
    pub fn register_processor(&self, node: &NodeId, worker: WorkerId) {
        let mut state = self.state.lock();
        state.processing.entry(node.clone()).or_insert(worker);
    }

    /// Remove the ownership record if it belongs to `worker`.
    pub fn unregister_processor(&self, node: &NodeId, worker: WorkerId) {
        let mut state = self.state.lock();
        if state.processing.get(node) == Some(&worker) {
            state.processing.remove(node);
        }
    }

    /// Try to record that `worker` waits on `node`. Returns false, leaving the
    /// state untouched, when the wait would be a self-wait or close a cycle.
    pub fn register_waiter(&self, node: &NodeId, worker: WorkerId) -> bool {
        let mut state = self.state.lock();
        if state.would_deadlock(node, worker) {
            debug!(
                node = %node,
                worker = %worker,
                owner = ?state.processing.get(node),
                "Refusing wait: would deadlock"
            );
            return false;
        }
        *state
            .waiting_for
            .entry(worker)
            .or_default()
            .entry(node.clone())
            .or_insert(0) += 1;
        trace!(node = %node, worker = %worker, "Registered wait");
        true
    }

    pub fn unregister_waiter(&self, node: &NodeId, worker: WorkerId) {
        let mut state = self.state.lock();
        let Some(waits) = state.waiting_for.get_mut(&worker) else {
            return;
        };
        if let Some(count) = waits.get_mut(node) {
            *count -= 1;
            if *count == 0 {
                waits.remove(node);
            }
        }
        if waits.is_empty() {
            state.waiting_for.remove(&worker);
        }
    }

    pub fn owner_of(&self, node: &NodeId) -> Option<WorkerId> {
        self.state.lock().processing.get(node).copied()
    }

    pub fn is_waiting(&self, worker: WorkerId, node: &NodeId) -> bool {
        self.state
            .lock()
            .waiting_for
            .get(&worker)
            .is_some_and(|waits| waits.contains_key(node))
    }

    /// Number of ownership records plus wait edges still registered.
    pub fn registration_count(&self) -> usize {
        let state = self.state.lock();
        state.processing.len()
            + state
                .waiting_for
                .values()
                .map(|waits| waits.values().sum::<usize>())
                .sum::<usize>()
    }

    /// Register ownership and return a guard that unregisters it on drop.
    pub fn claim(self: &Arc<Self>, node: &NodeId, worker: WorkerId) -> ProcessorGuard {
        self.register_processor(node, worker);
        ProcessorGuard {
            tracker: Arc::clone(self),
            node: node.clone(),
            worker,
        }
    }

    /// Register a wait and return a guard that unregisters it on drop, or
    /// `None` if the wait would deadlock.
    pub fn try_wait(self: &Arc<Self>, node: &NodeId, worker: WorkerId) -> Option<WaitGuard> {
        if !self.register_waiter(node, worker) {
            return None;
        }
        Some(WaitGuard {
            tracker: Arc::clone(self),
            node: node.clone(),
            worker,
        })
    }
}

/// Ownership registration released on drop.
#[must_use = "dropping the guard unregisters the owner immediately"]
pub struct ProcessorGuard {
    tracker: Arc<WorkerDependencyTracker>,
    node: NodeId,
    worker: WorkerId,
}

impl Drop for ProcessorGuard {
    fn drop(&mut self) {
        self.tracker.unregister_processor(&self.node, self.worker);
    }
}

/// Wait registration released on drop.
#[must_use = "dropping the guard unregisters the wait immediately"]
pub struct WaitGuard {
    tracker: Arc<WorkerDependencyTracker>,
    node: NodeId,
    worker: WorkerId,
}

impl WaitGuard {
    pub fn node(&self) -> &NodeId {
        &self.node
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.tracker.unregister_waiter(&self.node, self.worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        s.to_string()
    }

    #[test]
    fn two_worker_cycle_is_rejected_until_edge_removed() {
        let tracker = WorkerDependencyTracker::new();
        let (t1, t2) = (WorkerId::next(), WorkerId::next());

        tracker.register_processor(&id("A"), t1);
        tracker.register_processor(&id("B"), t2);
        assert!(tracker.register_waiter(&id("B"), t1));
        assert!(!tracker.register_waiter(&id("A"), t2));
        assert!(!tracker.is_waiting(t2, &id("A")));

        tracker.unregister_waiter(&id("B"), t1);
        assert!(tracker.register_waiter(&id("A"), t2));
    }

    #[test]
    fn self_wait_is_always_rejected() {
        let tracker = WorkerDependencyTracker::new();
        let t1 = WorkerId::next();
        tracker.register_processor(&id("A"), t1);
        assert!(!tracker.register_waiter(&id("A"), t1));
        assert_eq!(tracker.registration_count(), 1);
    }

    #[test]
    fn three_worker_cycle_is_rejected() {
        let tracker = WorkerDependencyTracker::new();
        let (t1, t2, t3) = (WorkerId::next(), WorkerId::next(), WorkerId::next());
        tracker.register_processor(&id("A"), t1);
        tracker.register_processor(&id("B"), t2);
        tracker.register_processor(&id("C"), t3);

        assert!(tracker.register_waiter(&id("B"), t1));
        assert!(tracker.register_waiter(&id("C"), t2));
        assert!(!tracker.register_waiter(&id("A"), t3));
        // A chain that does not loop back is fine.
        let t4 = WorkerId::next();
        assert!(tracker.register_waiter(&id("A"), t4));
    }

    #[test]
    fn waiting_on_unowned_node_is_allowed() {
        let tracker = WorkerDependencyTracker::new();
        let t1 = WorkerId::next();
        assert!(tracker.register_waiter(&id("free"), t1));
        assert!(tracker.is_waiting(t1, &id("free")));
    }

    #[test]
    fn register_processor_is_idempotent_and_keeps_first_owner() {
        let tracker = WorkerDependencyTracker::new();
        let (t1, t2) = (WorkerId::next(), WorkerId::next());
        tracker.register_processor(&id("A"), t1);
        tracker.register_processor(&id("A"), t1);
        tracker.register_processor(&id("A"), t2);
        assert_eq!(tracker.owner_of(&id("A")), Some(t1));

        tracker.unregister_processor(&id("A"), t2);
        assert_eq!(tracker.owner_of(&id("A")), Some(t1));
        tracker.unregister_processor(&id("A"), t1);
        assert_eq!(tracker.owner_of(&id("A")), None);
    }

    #[test]
    fn counted_waits_release_independently() {
        let tracker = WorkerDependencyTracker::new();
        let t1 = WorkerId::next();
        assert!(tracker.register_waiter(&id("A"), t1));
        assert!(tracker.register_waiter(&id("A"), t1));
        tracker.unregister_waiter(&id("A"), t1);
        assert!(tracker.is_waiting(t1, &id("A")));
        tracker.unregister_waiter(&id("A"), t1);
        assert!(!tracker.is_waiting(t1, &id("A")));
        assert_eq!(tracker.registration_count(), 0);
    }

    #[test]
    fn guards_unregister_on_drop() {
        let tracker = Arc::new(WorkerDependencyTracker::new());
        let (t1, t2) = (WorkerId::next(), WorkerId::next());
        {
            let _claim = tracker.claim(&id("A"), t1);
            let wait = tracker.try_wait(&id("A"), t2).expect("no cycle");
            assert_eq!(wait.node(), "A");
            assert_eq!(tracker.registration_count(), 2);
            assert!(tracker.try_wait(&id("A"), t1).is_none());
        }
        assert_eq!(tracker.registration_count(), 0);
    }

    #[test]
    fn concurrent_cross_waits_admit_at_most_one_side() {
        for _ in 0..200 {
            let tracker = Arc::new(WorkerDependencyTracker::new());
            let (t1, t2) = (WorkerId::next(), WorkerId::next());
            tracker.register_processor(&id("A"), t1);
            tracker.register_processor(&id("B"), t2);

            let a = {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.register_waiter(&id("B"), t1))
            };
            let b = {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.register_waiter(&id("A"), t2))
            };
            let admitted = [a.join().unwrap(), b.join().unwrap()];
            assert_eq!(admitted.iter().filter(|ok| **ok).count(), 1);
        }
    }
}
