//! Bottom-up documentation walk.
//!
//! A run starts from one root node. Each node is owned by exactly one worker
//! (see [`NodeStations`]); the owner resolves the node's children, processes
//! them first (inline or on pooled workers), and only then generates the
//! node's own artifact. Other workers that reach an owned node wait for it
//! unless the [`WorkerDependencyTracker`] reports that waiting would close a
//! cycle, in which case, or when the wait times out, a degraded artifact
//! comes from the [`FallbackComputer`].

use crate::dispatch::{Dispatch, DispatchPolicy};
use crate::fallback::FallbackComputer;
use crate::generate::run_generator;
use crate::navigation::{Navigation, NavigationKind, NavigationResolver};
use crate::pool::WorkerPool;
use crate::worker::WorkerContext;
use codegraph_concurrent::{
    Admission, NodeStations, OwnerHandle, StationHandle, StationValue, WaitError, WaitGuard,
    WorkerDependencyTracker,
};
use codegraph_core::{
    Artifact, ArtifactGenerator, ArtifactKind, CodeGraphError, FallbackReason, GenerationRequest,
    GraphStore, NodeId, SourceNode, WalkerConfig,
};
use futures::future::{BoxFuture, FutureExt};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub nodes_generated: usize,
    pub cached_hits: usize,
    pub deadlock_fallbacks: usize,
    pub timeout_fallbacks: usize,
    pub generation_errors: usize,
    pub peak_active_workers: usize,
    /// Dependency-tracker registrations still present after the run.
    pub leaked_registrations: usize,
}

/// Outcome of [`BottomUpWalker::process`].
#[derive(Debug)]
pub struct RunResult {
    pub run_id: Uuid,
    /// Final artifact of every reached node, in the order nodes completed.
    pub artifacts: Vec<Artifact>,
    /// Every node the run reached, in first-visit order.
    pub source_nodes: Vec<SourceNode>,
    pub error: Option<CodeGraphError>,
    pub stats: RunStats,
}

impl RunResult {
    fn failed(run_id: Uuid, error: CodeGraphError) -> Self {
        Self {
            run_id,
            artifacts: Vec::new(),
            source_nodes: Vec::new(),
            error: Some(error),
            stats: RunStats::default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn artifact(&self, node: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.source_node_id == node)
    }
}

#[derive(Debug, Default)]
struct RunCounters {
    generated: AtomicUsize,
    cached: AtomicUsize,
    deadlock_fallbacks: AtomicUsize,
    timeout_fallbacks: AtomicUsize,
    generation_errors: AtomicUsize,
}

impl RunCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn fallback(&self, reason: FallbackReason) {
        match reason {
            FallbackReason::Deadlock => Self::bump(&self.deadlock_fallbacks),
            FallbackReason::Timeout => Self::bump(&self.timeout_fallbacks),
            FallbackReason::Error => Self::bump(&self.generation_errors),
        }
    }
}

/// Entry point of the walk. Holds the collaborators and configuration; every
/// call to [`process`](Self::process) is an independent run.
pub struct BottomUpWalker {
    store: Arc<dyn GraphStore>,
    generator: Arc<dyn ArtifactGenerator>,
    config: WalkerConfig,
}

impl BottomUpWalker {
    pub fn new(
        store: Arc<dyn GraphStore>,
        generator: Arc<dyn ArtifactGenerator>,
        config: WalkerConfig,
    ) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    /// Document the node at `root_path` and everything below it.
    pub async fn process(&self, root_path: &str) -> RunResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("docwalk_run", %run_id, root = root_path);
        self.process_inner(run_id, root_path).instrument(span).await
    }

    async fn process_inner(&self, run_id: Uuid, root_path: &str) -> RunResult {
        let root = match self.store.get_node_by_path(root_path).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                error!(path = root_path, "Root node not found");
                let error = CodeGraphError::NodeNotFound(root_path.to_string());
                return RunResult::failed(run_id, error);
            }
            Err(e) => {
                error!(path = root_path, error = %e, "Root lookup failed");
                return RunResult::failed(run_id, e);
            }
        };

        let run = Arc::new(WalkRun::new(
            Arc::clone(&self.store),
            Arc::clone(&self.generator),
            self.config.clone(),
        ));
        info!(
            root = %root.id,
            max_workers = run.pool.max_workers(),
            fallback_timeout = ?self.config.fallback_timeout(),
            "Starting documentation walk"
        );

        let slot = match run.pool.acquire().await {
            Ok(slot) => slot,
            Err(e) => return RunResult::failed(run_id, e),
        };
        let mut ctx = WorkerContext::new();
        run.process_node(root, &mut ctx).await;
        drop(slot);

        let result = run.finish(run_id);
        info!(
            artifacts = result.artifacts.len(),
            generated = result.stats.nodes_generated,
            cached = result.stats.cached_hits,
            deadlock_fallbacks = result.stats.deadlock_fallbacks,
            timeout_fallbacks = result.stats.timeout_fallbacks,
            errors = result.stats.generation_errors,
            "Documentation walk finished"
        );
        result
    }
}

enum Joined {
    Ready(Artifact),
    Spawned {
        node: NodeId,
        handle: JoinHandle<Artifact>,
        _join_wait: WaitGuard,
    },
}

/// Shared state of a single run.
struct WalkRun {
    store: Arc<dyn GraphStore>,
    generator: Arc<dyn ArtifactGenerator>,
    config: WalkerConfig,
    stations: Arc<NodeStations>,
    tracker: Arc<WorkerDependencyTracker>,
    pool: WorkerPool,
    navigation: NavigationResolver,
    dispatch: DispatchPolicy,
    fallback: FallbackComputer,
    visited: Mutex<(HashSet<NodeId>, Vec<SourceNode>)>,
    counters: RunCounters,
}

impl WalkRun {
    fn new(
        store: Arc<dyn GraphStore>,
        generator: Arc<dyn ArtifactGenerator>,
        config: WalkerConfig,
    ) -> Self {
        let stations = Arc::new(NodeStations::new());
        let navigation = NavigationResolver::new(Arc::clone(&store));
        let fallback = FallbackComputer::new(
            navigation.clone(),
            Arc::clone(&generator),
            Arc::clone(&stations),
            config.generation_timeout(),
        );
        Self {
            pool: WorkerPool::new(config.max_workers),
            dispatch: DispatchPolicy::new(config.max_workers),
            tracker: Arc::new(WorkerDependencyTracker::new()),
            store,
            generator,
            config,
            stations,
            navigation,
            fallback,
            visited: Mutex::new((HashSet::new(), Vec::new())),
            counters: RunCounters::default(),
        }
    }

    fn visit(&self, node: &SourceNode) {
        let mut visited = self.visited.lock();
        let (seen, order) = &mut *visited;
        if seen.insert(node.id.clone()) {
            order.push(node.clone());
        }
    }

    /// Resolve `node` to an artifact: compute it as owner, or wait for (or
    /// work around) its current owner.
    fn process_node<'a>(
        self: &'a Arc<Self>,
        node: SourceNode,
        ctx: &'a mut WorkerContext,
    ) -> BoxFuture<'a, Artifact> {
        async move {
            self.visit(&node);
            match self.stations.acquire(&node.id, ctx.id()) {
                Admission::Owner(owner) => self.run_owned(owner, node, ctx).await,
                Admission::Waiter(handle) => self.wait_for(handle, &node, ctx).await,
            }
        }
        .boxed()
    }

    async fn run_owned(
        self: &Arc<Self>,
        owner: OwnerHandle,
        node: SourceNode,
        ctx: &mut WorkerContext,
    ) -> Artifact {
        let _claim = self.tracker.claim(&node.id, ctx.id());

        if let Some(artifact) = self.existing_artifact(&node).await {
            owner.publish(artifact.clone());
            return artifact;
        }

        ctx.enter(&node.id);
        let artifact = self.compute(&node, ctx).await;
        ctx.leave(&node.id);

        owner.publish(artifact.clone());
        artifact
    }

    async fn existing_artifact(&self, node: &SourceNode) -> Option<Artifact> {
        if !self.config.use_existing_artifacts {
            return None;
        }
        match self.store.get_existing_artifact(&node.id).await {
            Ok(Some(mut artifact)) => {
                debug!(node = %node.id, "Using existing artifact");
                artifact.source_node_id = node.id.clone();
                artifact.kind = ArtifactKind::Cached;
                RunCounters::bump(&self.counters.cached);
                counter!("docwalk_cached_total").increment(1);
                Some(artifact)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(node = %node.id, error = %e, "Existing artifact lookup failed; computing");
                None
            }
        }
    }

    async fn compute(self: &Arc<Self>, node: &SourceNode, ctx: &mut WorkerContext) -> Artifact {
        let navigation = match self.navigation.resolve(node, ctx).await {
            Ok(nav) => nav,
            Err(e) => {
                warn!(node = %node.id, error = %e, "Could not resolve children");
                RunCounters::bump(&self.counters.generation_errors);
                counter!("docwalk_generation_errors_total").increment(1);
                return Artifact::error_fallback(&node.id, e.to_string());
            }
        };
        debug!(
            node = %node.id,
            worker = %ctx.id(),
            navigation = %navigation.kind,
            children = navigation.children.len(),
            recursive = navigation.recursive_calls.len(),
            "Resolved children"
        );

        let child_artifacts = self
            .process_children(navigation.kind, &navigation.children, ctx)
            .await;
        let recursive = Self::recursive_calls(&navigation, &child_artifacts, ctx);
        let cycles = if recursive.is_empty() {
            Vec::new()
        } else {
            match self.store.detect_cycles(&node.id).await {
                Ok(cycles) => cycles,
                Err(e) => {
                    warn!(node = %node.id, error = %e, "Cycle detection failed");
                    Vec::new()
                }
            }
        };

        let child_count = child_artifacts.len();
        let mut request = GenerationRequest::new(node.clone(), child_artifacts);
        request.recursive_calls = recursive_names(node, &navigation, &recursive);
        request.cycles = cycles.clone();

        let timeout = self.config.generation_timeout();
        let mut artifact = match run_generator(self.generator.as_ref(), &request, timeout).await {
            Ok(text) if navigation.is_leaf() => Artifact::leaf(&node.id, text),
            Ok(text) => Artifact::parent(&node.id, text, child_count),
            Err(e) => {
                warn!(node = %node.id, error = %e, "Generation failed");
                RunCounters::bump(&self.counters.generation_errors);
                counter!("docwalk_generation_errors_total").increment(1);
                return Artifact::error_fallback(&node.id, e.to_string());
            }
        };
        RunCounters::bump(&self.counters.generated);
        counter!("docwalk_nodes_generated_total").increment(1);

        artifact.metadata.recursive_calls = recursive;
        artifact.metadata.cycles = cycles;
        artifact
    }

    /// Recursive calls to attach to a node: its own filtered children plus,
    /// for call-graph nodes, those of its children that point back into the
    /// current path.
    fn recursive_calls(
        navigation: &Navigation,
        child_artifacts: &[Artifact],
        ctx: &WorkerContext,
    ) -> BTreeSet<NodeId> {
        let mut recursive: BTreeSet<NodeId> = navigation.recursive_call_ids().cloned().collect();
        if navigation.kind == NavigationKind::CallGraph {
            for child in child_artifacts {
                recursive.extend(
                    child
                        .metadata
                        .recursive_calls
                        .iter()
                        .filter(|id| ctx.on_path(id))
                        .cloned(),
                );
            }
        }
        recursive
    }

    async fn process_children(
        self: &Arc<Self>,
        kind: NavigationKind,
        children: &[SourceNode],
        ctx: &mut WorkerContext,
    ) -> Vec<Artifact> {
        let mut artifacts = Vec::with_capacity(children.len());
        let mut next = 0;
        while next < children.len() {
            let remaining = children.len() - next;
            match self.dispatch.plan(kind, remaining, self.pool.active()) {
                Dispatch::Inline => {
                    let artifact = self.process_node(children[next].clone(), ctx).await;
                    artifacts.push(artifact);
                    next += 1;
                }
                Dispatch::Parallel(batch) => {
                    let end = next + batch;
                    let batch_artifacts = self.dispatch_parallel(&children[next..end], ctx).await;
                    artifacts.extend(batch_artifacts);
                    next = end;
                }
            }
        }
        artifacts
    }

    /// Submit `children` to the pool and join them in order. The submitting
    /// worker is registered as waiting on each child until it is joined.
    async fn dispatch_parallel(
        self: &Arc<Self>,
        children: &[SourceNode],
        ctx: &mut WorkerContext,
    ) -> Vec<Artifact> {
        let mut joined = Vec::with_capacity(children.len());
        for child in children {
            let Some(join_wait) = self.tracker.try_wait(&child.id, ctx.id()) else {
                self.visit(child);
                // The owner may have published and not yet released its claim.
                if let Some(artifact) = self.stations.peek(&child.id) {
                    joined.push(Joined::Ready(artifact));
                    continue;
                }
                warn!(
                    node = %child.id,
                    worker = %ctx.id(),
                    "Joining child would deadlock; using fallback"
                );
                let artifact = self.fallback_for(child, FallbackReason::Deadlock, ctx).await;
                joined.push(Joined::Ready(artifact));
                continue;
            };

            let Some(slot) = self.pool.try_acquire() else {
                debug!(node = %child.id, "Pool saturated; processing child inline");
                drop(join_wait);
                joined.push(Joined::Ready(self.process_node(child.clone(), ctx).await));
                continue;
            };

            let run = Arc::clone(self);
            let task_node = child.clone();
            let handle = tokio::spawn(
                async move {
                    let _slot = slot;
                    let mut worker = WorkerContext::new();
                    debug!(node = %task_node.id, worker = %worker.id(), "Worker started");
                    run.process_node(task_node, &mut worker).await
                }
                .in_current_span(),
            );
            joined.push(Joined::Spawned {
                node: child.id.clone(),
                handle,
                _join_wait: join_wait,
            });
        }

        let mut artifacts = Vec::with_capacity(joined.len());
        for entry in joined {
            let artifact = match entry {
                Joined::Ready(artifact) => artifact,
                Joined::Spawned { node, handle, .. } => match handle.await {
                    Ok(artifact) => artifact,
                    Err(e) => {
                        error!(node = %node, error = %e, "Worker task failed");
                        RunCounters::bump(&self.counters.generation_errors);
                        Artifact::error_fallback(&node, format!("worker failed: {}", e))
                    }
                },
            };
            artifacts.push(artifact);
        }
        artifacts
    }

    async fn wait_for(
        &self,
        handle: StationHandle,
        node: &SourceNode,
        ctx: &WorkerContext,
    ) -> Artifact {
        match handle.value() {
            Some(StationValue::Published(artifact)) | Some(StationValue::Provisional(artifact)) => {
                return artifact
            }
            Some(StationValue::Failed(error)) => return Artifact::error_fallback(&node.id, error),
            None => {}
        }

        let Some(wait) = self.tracker.try_wait(&node.id, ctx.id()) else {
            if let Some(artifact) = handle.peek() {
                return artifact;
            }
            warn!(
                node = %node.id,
                worker = %ctx.id(),
                owner = %handle.owner(),
                "Waiting would deadlock; using fallback"
            );
            return self.fallback_for(node, FallbackReason::Deadlock, ctx).await;
        };
        let outcome = handle.wait(self.config.fallback_timeout()).await;
        drop(wait);

        match outcome {
            Ok(artifact) => artifact,
            Err(WaitError::Timeout(after)) => {
                warn!(
                    node = %node.id,
                    worker = %ctx.id(),
                    owner = %handle.owner(),
                    ?after,
                    "Wait timed out; using fallback"
                );
                self.fallback_for(node, FallbackReason::Timeout, ctx).await
            }
            Err(e @ (WaitError::OwnerFailed(_) | WaitError::Closed)) => {
                warn!(node = %node.id, error = %e, "Owner did not produce a result");
                Artifact::error_fallback(&node.id, e.to_string())
            }
        }
    }

    async fn fallback_for(
        &self,
        node: &SourceNode,
        reason: FallbackReason,
        ctx: &WorkerContext,
    ) -> Artifact {
        self.counters.fallback(reason);
        self.fallback.compute(node, reason, ctx).await
    }

    fn finish(&self, run_id: Uuid) -> RunResult {
        let leaked = self.tracker.registration_count();
        if leaked > 0 {
            warn!(leaked, "Dependency registrations left after run");
        }
        let source_nodes = std::mem::take(&mut self.visited.lock().1);
        let c = &self.counters;
        RunResult {
            run_id,
            artifacts: self.stations.completed(),
            source_nodes,
            error: None,
            stats: RunStats {
                nodes_generated: c.generated.load(Ordering::Relaxed),
                cached_hits: c.cached.load(Ordering::Relaxed),
                deadlock_fallbacks: c.deadlock_fallbacks.load(Ordering::Relaxed),
                timeout_fallbacks: c.timeout_fallbacks.load(Ordering::Relaxed),
                generation_errors: c.generation_errors.load(Ordering::Relaxed),
                peak_active_workers: self.pool.peak(),
                leaked_registrations: leaked,
            },
        }
    }
}

fn recursive_names(
    node: &SourceNode,
    navigation: &Navigation,
    recursive: &BTreeSet<NodeId>,
) -> Vec<String> {
    recursive
        .iter()
        .map(|id| {
            if *id == node.id {
                return node.name.clone();
            }
            navigation
                .recursive_calls
                .iter()
                .find(|n| n.id == *id)
                .map(|n| n.name.clone())
                .unwrap_or_else(|| id.clone())
        })
        .collect()
}
