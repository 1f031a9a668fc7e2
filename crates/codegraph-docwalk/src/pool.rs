use codegraph_core::{CodeGraphError, Result};
use metrics::gauge;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct PoolState {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    peak: AtomicUsize,
}

impl PoolState {
    fn active(&self) -> usize {
        self.max_workers - self.semaphore.available_permits()
    }
}

/// Bounded set of worker permits shared by one run. A worker holds a
/// [`WorkerSlot`] for as long as it is computing nodes.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    state: Arc<PoolState>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            state: Arc::new(PoolState {
                semaphore: Arc::new(Semaphore::new(max_workers)),
                max_workers,
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<WorkerSlot> {
        let permit = Arc::clone(&self.state.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CodeGraphError::InvalidOperation("worker pool closed".to_string()))?;
        Ok(self.slot(permit))
    }

    /// Take a free slot if one is available right now.
    pub fn try_acquire(&self) -> Option<WorkerSlot> {
        Arc::clone(&self.state.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.slot(permit))
    }

    pub fn active(&self) -> usize {
        self.state.active()
    }

    /// Highest number of simultaneously held slots so far.
    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::Acquire)
    }

    pub fn max_workers(&self) -> usize {
        self.state.max_workers
    }

    fn slot(&self, permit: OwnedSemaphorePermit) -> WorkerSlot {
        let active = self.state.active();
        self.state.peak.fetch_max(active, Ordering::AcqRel);
        gauge!("docwalk_active_workers").set(active as f64);
        WorkerSlot {
            _permit: permit,
            state: Arc::clone(&self.state),
        }
    }
}

/// A held worker permit, released on drop.
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    state: Arc<PoolState>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        // The permit is released after this body runs.
        let active = self.state.active().saturating_sub(1);
        gauge!("docwalk_active_workers").set(active as f64);
    }
}
