#![allow(dead_code)]

use async_trait::async_trait;
use codegraph_concurrent::LockFreeAdjacencyGraph;
use codegraph_core::{
    Artifact, ArtifactGenerator, CodeGraphError, EdgeType, GenerationRequest, GraphStore, NodeId,
    NodeKind, Result, SourceNode, WalkerConfig,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Generator that records every request, can be slowed down or made to fail
/// per node, and tracks how many calls run at once.
#[derive(Default)]
pub struct RecordingGenerator {
    delays: HashMap<NodeId, Duration>,
    default_delay: Duration,
    failures: HashSet<NodeId>,
    requests: Mutex<Vec<GenerationRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the authoritative (non-fallback) generation of `node`.
    pub fn delay(mut self, node: &str, delay: Duration) -> Self {
        self.delays.insert(node.to_string(), delay);
        self
    }

    pub fn delay_all(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn fail_on(mut self, node: &str) -> Self {
        self.failures.insert(node.to_string());
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Node ids in the order their generation finished (fallbacks excluded).
    pub fn order(&self) -> Vec<NodeId> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.fallback.is_none())
            .map(|r| r.node.id.clone())
            .collect()
    }

    pub fn request_for(&self, node: &str) -> Option<GenerationRequest> {
        self.requests
            .lock()
            .iter()
            .find(|r| r.node.id == node && r.fallback.is_none())
            .cloned()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ArtifactGenerator for RecordingGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _timeout: Duration,
    ) -> anyhow::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if request.fallback.is_none() {
            let delay = self
                .delays
                .get(&request.node.id)
                .copied()
                .unwrap_or(self.default_delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if self.failures.contains(&request.node.id) {
            anyhow::bail!("model refused {}", request.node.id);
        }
        Ok(format!(
            "docs for {} ({} deps)",
            request.node.name,
            request.child_artifacts.len()
        ))
    }

    fn generator_name(&self) -> &str {
        "recording"
    }
}

/// Store wrapper that slows down child lookups.
pub struct DelayedStore {
    inner: Arc<LockFreeAdjacencyGraph>,
    delay: Duration,
}

impl DelayedStore {
    pub fn new(inner: Arc<LockFreeAdjacencyGraph>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl GraphStore for DelayedStore {
    async fn get_node_by_path(&self, path: &str) -> Result<Option<SourceNode>> {
        self.inner.get_node_by_path(path).await
    }

    async fn get_containment_children(&self, id: &NodeId) -> Result<Vec<SourceNode>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_containment_children(id).await
    }

    async fn get_call_graph_children(&self, id: &NodeId) -> Result<Vec<SourceNode>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_call_graph_children(id).await
    }

    async fn detect_cycles(&self, id: &NodeId) -> Result<Vec<Vec<String>>> {
        self.inner.detect_cycles(id).await
    }

    async fn get_existing_artifact(&self, id: &NodeId) -> Result<Option<Artifact>> {
        self.inner.get_existing_artifact(id).await
    }
}

/// Store wrapper whose child lookups fail for selected nodes.
pub struct FailingStore {
    inner: Arc<LockFreeAdjacencyGraph>,
    broken: HashSet<NodeId>,
}

impl FailingStore {
    pub fn new(inner: Arc<LockFreeAdjacencyGraph>) -> Self {
        Self {
            inner,
            broken: HashSet::new(),
        }
    }

    pub fn break_children_of(mut self, node: &str) -> Self {
        self.broken.insert(node.to_string());
        self
    }

    fn check(&self, id: &NodeId) -> Result<()> {
        if self.broken.contains(id) {
            return Err(CodeGraphError::Graph(format!("index corrupt below {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FailingStore {
    async fn get_node_by_path(&self, path: &str) -> Result<Option<SourceNode>> {
        self.inner.get_node_by_path(path).await
    }

    async fn get_containment_children(&self, id: &NodeId) -> Result<Vec<SourceNode>> {
        self.check(id)?;
        self.inner.get_containment_children(id).await
    }

    async fn get_call_graph_children(&self, id: &NodeId) -> Result<Vec<SourceNode>> {
        self.check(id)?;
        self.inner.get_call_graph_children(id).await
    }

    async fn detect_cycles(&self, id: &NodeId) -> Result<Vec<Vec<String>>> {
        self.inner.detect_cycles(id).await
    }

    async fn get_existing_artifact(&self, id: &NodeId) -> Result<Option<Artifact>> {
        self.inner.get_existing_artifact(id).await
    }
}

pub fn node(id: &str, kind: NodeKind) -> SourceNode {
    SourceNode::new(id, id, id)
        .with_kind(kind)
        .with_content(format!("// source of {}", id))
}

/// Small graph builder over the in-memory store. Node paths equal their ids.
#[derive(Default)]
pub struct GraphBuilder {
    graph: LockFreeAdjacencyGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(self, id: &str, kind: NodeKind) -> Self {
        self.graph.add_node(node(id, kind));
        self
    }

    pub fn contains(self, parent: &str, child: &str) -> Self {
        self.graph
            .add_edge(&parent.to_string(), &child.to_string(), EdgeType::Contains);
        self
    }

    pub fn calls(self, caller: &str, callee: &str) -> Self {
        self.graph
            .add_edge(&caller.to_string(), &callee.to_string(), EdgeType::Calls);
        self
    }

    pub fn existing(self, artifact: Artifact) -> Self {
        self.graph.store_artifact(artifact);
        self
    }

    pub fn build(self) -> Arc<LockFreeAdjacencyGraph> {
        Arc::new(self.graph)
    }
}

pub fn config(max_workers: usize) -> WalkerConfig {
    WalkerConfig::default()
        .with_max_workers(max_workers)
        .with_fallback_timeout(Duration::from_secs(30))
        .with_generation_timeout(Duration::from_secs(30))
}
