use crate::navigation::NavigationKind;

/// How the next children of a node are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Run the next child on the current worker.
    Inline,
    /// Submit the next `n` children to the pool.
    Parallel(usize),
}

/// Chooses between inline and parallel processing of children from the edge
/// kind and the pool's spare capacity. Re-evaluated after every batch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    max_workers: usize,
}

impl DispatchPolicy {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Spare workers given `active` busy ones, never below 1.
    pub fn capacity(&self, active: usize) -> usize {
        self.max_workers.saturating_sub(active).max(1)
    }

    pub fn plan(&self, kind: NavigationKind, remaining: usize, active: usize) -> Dispatch {
        if kind == NavigationKind::CallGraph || remaining <= 1 {
            return Dispatch::Inline;
        }
        match self.capacity(active) {
            1 => Dispatch::Inline,
            capacity => Dispatch::Parallel(capacity.min(remaining)),
        }
    }
}
