//! Per-node single-flight admission with result broadcast.
//!
//! The first worker to ask for a node becomes its owner; everyone else gets a
//! handle to wait on. Each station carries a `watch` channel that goes from
//! empty to a terminal value exactly once (a provisional fallback value may
//! later be replaced by the owner's authoritative one, never the reverse).

use crate::dependency::WorkerId;
use codegraph_core::{Artifact, NodeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for node owner")]
    Timeout(Duration),
    #[error("node owner failed: {0}")]
    OwnerFailed(String),
    #[error("station closed without a result")]
    Closed,
}

/// Value held by a station once it leaves the empty state.
#[derive(Debug, Clone, PartialEq)]
pub enum StationValue {
    /// Fallback stored while the owner was still computing.
    Provisional(Artifact),
    /// The owner's own result.
    Published(Artifact),
    Failed(String),
}

impl StationValue {
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            StationValue::Provisional(a) | StationValue::Published(a) => Some(a),
            StationValue::Failed(_) => None,
        }
    }
}

#[derive(Debug)]
struct Station {
    owner: WorkerId,
    value: watch::Sender<Option<StationValue>>,
}

impl Station {
    fn new(owner: WorkerId) -> Self {
        let (value, _) = watch::channel(None);
        Self { owner, value }
    }
}

/// Outcome of [`NodeStations::acquire`].
pub enum Admission {
    /// Caller must compute the node and publish through the handle.
    Owner(OwnerHandle),
    /// Someone else owns the node.
    Waiter(StationHandle),
}

/// The run-wide station table. One map, one lock, never held across a wait.
#[derive(Debug, Default)]
pub struct NodeStations {
    stations: Mutex<HashMap<NodeId, Arc<Station>>>,
    completion_order: Mutex<Vec<NodeId>>,
}

impl NodeStations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `node` for `worker`, or get a handle on the existing station.
    pub fn acquire(self: &Arc<Self>, node: &NodeId, worker: WorkerId) -> Admission {
        let mut stations = self.stations.lock();
        if let Some(station) = stations.get(node) {
            return Admission::Waiter(StationHandle {
                station: Arc::clone(station),
            });
        }

        let station = Arc::new(Station::new(worker));
        stations.insert(node.clone(), Arc::clone(&station));
        drop(stations);

        Admission::Owner(OwnerHandle {
            stations: Arc::clone(self),
            node: node.clone(),
            station,
            settled: false,
        })
    }

    /// Non-blocking read of a node's current artifact, provisional or not.
    pub fn peek(&self, node: &NodeId) -> Option<Artifact> {
        let station = self.station(node)?;
        let value = station.value.borrow();
        value.as_ref().and_then(StationValue::artifact).cloned()
    }

    /// Store a fallback artifact if the node's slot is still empty. Returns
    /// whether it was stored.
    pub fn offer_fallback(&self, node: &NodeId, artifact: Artifact) -> bool {
        let Some(station) = self.station(node) else {
            return false;
        };
        let stored = station.value.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(StationValue::Provisional(artifact));
                true
            } else {
                false
            }
        });
        if stored {
            self.record_completion(node);
        }
        stored
    }

    pub fn is_empty(&self) -> bool {
        self.stations.lock().is_empty()
    }

    /// Final artifacts in the order their stations first completed.
    pub fn completed(&self) -> Vec<Artifact> {
        let order = self.completion_order.lock().clone();
        order
            .iter()
            .filter_map(|node| self.peek(node))
            .collect()
    }

    fn station(&self, node: &NodeId) -> Option<Arc<Station>> {
        self.stations.lock().get(node).cloned()
    }

    fn record_completion(&self, node: &NodeId) {
        self.completion_order.lock().push(node.clone());
    }
}

/// Read/wait access to a station owned by another worker.
#[derive(Debug, Clone)]
pub struct StationHandle {
    station: Arc<Station>,
}

impl StationHandle {
    pub fn owner(&self) -> WorkerId {
        self.station.owner
    }

    pub fn peek(&self) -> Option<Artifact> {
        self.station
            .value
            .borrow()
            .as_ref()
            .and_then(StationValue::artifact)
            .cloned()
    }

    pub fn value(&self) -> Option<StationValue> {
        self.station.value.borrow().clone()
    }

    /// Block until the station holds a value, at most `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Result<Artifact, WaitError> {
        let mut rx = self.station.value.subscribe();
        let value = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Err(_) => return Err(WaitError::Timeout(timeout)),
            Ok(Err(_)) => return Err(WaitError::Closed),
            Ok(Ok(value)) => value.clone(),
        };
        match value {
            Some(StationValue::Published(artifact)) | Some(StationValue::Provisional(artifact)) => {
                Ok(artifact)
            }
            Some(StationValue::Failed(error)) => Err(WaitError::OwnerFailed(error)),
            None => Err(WaitError::Closed),
        }
    }
}

/// Exclusive right to settle a station. Dropping it unsettled fails the
/// station so that waiters are released.
#[derive(Debug)]
pub struct OwnerHandle {
    stations: Arc<NodeStations>,
    node: NodeId,
    station: Arc<Station>,
    settled: bool,
}

impl OwnerHandle {
    /// Publish the authoritative artifact and wake every waiter. Replaces a
    /// provisional fallback; returns false only if the slot already held an
    /// authoritative or failed value.
    pub fn publish(mut self, artifact: Artifact) -> bool {
        self.settled = true;
        let mut was_empty = false;
        let stored = self.station.value.send_if_modified(|slot| match slot {
            None => {
                was_empty = true;
                *slot = Some(StationValue::Published(artifact));
                true
            }
            Some(StationValue::Provisional(_)) => {
                *slot = Some(StationValue::Published(artifact));
                true
            }
            Some(_) => false,
        });
        if was_empty {
            self.stations.record_completion(&self.node);
        } else if stored {
            debug!(node = %self.node, "Authoritative result replaced provisional fallback");
        }
        stored
    }

    /// Settle the station with an error. A provisional value already present
    /// is kept.
    pub fn fail(mut self, error: impl Into<String>) -> bool {
        self.settled = true;
        self.settle_failed(error.into())
    }

    fn settle_failed(&self, error: String) -> bool {
        self.station.value.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(StationValue::Failed(error));
                true
            } else {
                false
            }
        })
    }
}

impl Drop for OwnerHandle {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                node = %self.node,
                owner = %self.station.owner,
                "Owner abandoned node without a result"
            );
            self.settle_failed("owner abandoned node".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{ArtifactKind, FallbackReason};

    fn node(s: &str) -> NodeId {
        s.to_string()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_owner_and_everyone_sees_the_same_artifact() {
        let stations = Arc::new(NodeStations::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let stations = Arc::clone(&stations);
            tasks.push(tokio::spawn(async move {
                match stations.acquire(&node("A"), WorkerId::next()) {
                    Admission::Owner(owner) => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let artifact = Artifact::leaf("A", "docs for A");
                        assert!(owner.publish(artifact.clone()));
                        (true, artifact)
                    }
                    Admission::Waiter(handle) => {
                        let artifact = handle.wait(Duration::from_secs(5)).await.unwrap();
                        (false, artifact)
                    }
                }
            }));
        }

        let mut owners = 0;
        let mut seen = Vec::new();
        for task in tasks {
            let (is_owner, artifact) = task.await.unwrap();
            owners += usize::from(is_owner);
            seen.push(artifact);
        }
        assert_eq!(owners, 1);
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(stations.completed().len(), 1);
    }

    #[tokio::test]
    async fn wait_times_out_while_owner_is_busy() {
        let stations = Arc::new(NodeStations::new());
        let Admission::Owner(_owner) = stations.acquire(&node("A"), WorkerId::next()) else {
            panic!("first acquire must own");
        };
        let Admission::Waiter(handle) = stations.acquire(&node("A"), WorkerId::next()) else {
            panic!("second acquire must wait");
        };
        let err = handle.wait(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, WaitError::Timeout(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn authoritative_replaces_provisional_but_never_the_reverse() {
        let stations = Arc::new(NodeStations::new());
        let Admission::Owner(owner) = stations.acquire(&node("A"), WorkerId::next()) else {
            panic!("first acquire must own");
        };
        let fallback = Artifact::fallback(
            "A",
            ArtifactKind::FallbackLeaf,
            "degraded",
            FallbackReason::Timeout,
        );
        assert!(stations.offer_fallback(&node("A"), fallback.clone()));
        assert_eq!(stations.peek(&node("A")), Some(fallback.clone()));
        assert!(!stations.offer_fallback(&node("A"), fallback.clone()));

        let real = Artifact::leaf("A", "real");
        assert!(owner.publish(real.clone()));
        assert_eq!(stations.peek(&node("A")), Some(real.clone()));

        assert!(!stations.offer_fallback(&node("A"), fallback));
        assert_eq!(stations.completed(), vec![real]);
    }

    #[tokio::test]
    async fn dropped_owner_releases_waiters_with_error() {
        let stations = Arc::new(NodeStations::new());
        let Admission::Owner(owner) = stations.acquire(&node("A"), WorkerId::next()) else {
            panic!("first acquire must own");
        };
        let Admission::Waiter(handle) = stations.acquire(&node("A"), WorkerId::next()) else {
            panic!("second acquire must wait");
        };
        let waiter = tokio::spawn(async move { handle.wait(Duration::from_secs(5)).await });
        drop(owner);
        assert!(matches!(waiter.await.unwrap(), Err(WaitError::OwnerFailed(_))));
        assert!(stations.peek(&node("A")).is_none());
        assert!(stations.completed().is_empty());
    }

    #[test]
    fn offer_without_station_is_ignored() {
        let stations = NodeStations::new();
        assert!(!stations.offer_fallback(&node("ghost"), Artifact::leaf("ghost", "x")));
        assert!(stations.is_empty());
    }
}
