use arc_swap::ArcSwap;
use async_trait::async_trait;
use codegraph_core::{
    Artifact, CodeGraphError, EdgeType, GraphStore, NodeId, Result as CgResult, SourceNode,
};
use crossbeam_skiplist::SkipMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{trace, warn};

const MAX_CYCLES: usize = 16;
const MAX_CYCLE_DEPTH: usize = 32;

type Adjacency = SkipMap<NodeId, Arc<ArcSwap<Vec<NodeId>>>>;

/// In-memory source graph built on lock-free maps.
/// - Nodes, the path index and persisted artifacts live in `SkipMap`s.
/// - Adjacency lists per node and edge type sit behind `ArcSwap<Vec<NodeId>>`
///   so readers never block and writers copy-on-write.
#[derive(Debug, Default)]
pub struct LockFreeAdjacencyGraph {
    nodes: SkipMap<NodeId, Arc<SourceNode>>,
    by_path: SkipMap<String, NodeId>,
    contains: Adjacency,
    calls: Adjacency,
    artifacts: SkipMap<NodeId, Arc<Artifact>>,
}

impl LockFreeAdjacencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. The first node registered for a path keeps
    /// the path index entry.
    pub fn add_node(&self, node: SourceNode) {
        self.by_path.get_or_insert(node.path.clone(), node.id.clone());
        self.nodes.insert(node.id.clone(), Arc::new(node));
    }

    /// Add a directed edge from -> to. Duplicate edges are ignored so that
    /// child lists stay sets in insertion order.
    pub fn add_edge(&self, from: &NodeId, to: &NodeId, edge: EdgeType) {
        let entry = self
            .adjacency(edge)
            .get_or_insert_with(from.clone(), || Arc::new(ArcSwap::from_pointee(Vec::new())));
        let list = entry.value();

        // RCU-style copy-on-write update: retry on contention
        list.rcu(|current| {
            let mut next = (**current).clone();
            if !next.contains(to) {
                next.push(to.clone());
            }
            next
        });
    }

    /// Neighbour ids along one edge type, in insertion order.
    pub fn neighbors(&self, from: &NodeId, edge: EdgeType) -> Vec<NodeId> {
        self.adjacency(edge)
            .get(from)
            .map(|e| (*e.value().load().as_ref()).clone())
            .unwrap_or_default()
    }

    pub fn node(&self, id: &NodeId) -> Option<SourceNode> {
        self.nodes.get(id).map(|e| e.value().as_ref().clone())
    }

    /// Persist an artifact so later runs can reuse it.
    pub fn store_artifact(&self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.source_node_id.clone(), Arc::new(artifact));
    }

    fn adjacency(&self, edge: EdgeType) -> &Adjacency {
        match edge {
            EdgeType::Contains => &self.contains,
            EdgeType::Calls => &self.calls,
        }
    }

    fn children(&self, id: &NodeId, edge: EdgeType) -> CgResult<Vec<SourceNode>> {
        if !self.nodes.contains_key(id) {
            return Err(CodeGraphError::NodeNotFound(id.clone()));
        }
        Ok(self
            .neighbors(id, edge)
            .into_iter()
            .map(|child| {
                self.node(&child).unwrap_or_else(|| {
                    warn!(
                        parent = %id,
                        child = %child,
                        edge = %edge,
                        "Edge points at unknown node"
                    );
                    SourceNode::unresolved(child)
                })
            })
            .collect())
    }

    fn display_name(&self, id: &NodeId) -> String {
        self.nodes
            .get(id)
            .map(|e| e.value().name.clone())
            .unwrap_or_else(|| id.clone())
    }

    /// Depth-first search for call paths that return to `start`.
    fn call_cycles(&self, start: &NodeId) -> Vec<Vec<NodeId>> {
        let mut cycles = Vec::new();
        let mut path = vec![start.clone()];
        let mut on_path: HashSet<NodeId> = HashSet::from([start.clone()]);
        self.walk_cycles(start, &mut path, &mut on_path, &mut cycles);
        cycles
    }

    fn walk_cycles(
        &self,
        start: &NodeId,
        path: &mut Vec<NodeId>,
        on_path: &mut HashSet<NodeId>,
        cycles: &mut Vec<Vec<NodeId>>,
    ) {
        if cycles.len() >= MAX_CYCLES || path.len() > MAX_CYCLE_DEPTH {
            return;
        }
        let Some(current) = path.last().cloned() else {
            return;
        };
        for next in self.neighbors(&current, EdgeType::Calls) {
            if cycles.len() >= MAX_CYCLES {
                return;
            }
            if &next == start {
                let mut cycle = path.clone();
                cycle.push(start.clone());
                cycles.push(cycle);
            } else if on_path.insert(next.clone()) {
                path.push(next.clone());
                self.walk_cycles(start, path, on_path, cycles);
                path.pop();
                on_path.remove(&next);
            }
        }
    }
}

#[async_trait]
impl GraphStore for LockFreeAdjacencyGraph {
    async fn get_node_by_path(&self, path: &str) -> CgResult<Option<SourceNode>> {
        Ok(self.by_path.get(path).and_then(|e| self.node(e.value())))
    }

    async fn get_containment_children(&self, id: &NodeId) -> CgResult<Vec<SourceNode>> {
        self.children(id, EdgeType::Contains)
    }

    async fn get_call_graph_children(&self, id: &NodeId) -> CgResult<Vec<SourceNode>> {
        self.children(id, EdgeType::Calls)
    }

    async fn detect_cycles(&self, id: &NodeId) -> CgResult<Vec<Vec<String>>> {
        let cycles = self.call_cycles(id);
        trace!(node = %id, count = cycles.len(), "Detected call cycles");
        Ok(cycles
            .into_iter()
            .map(|cycle| cycle.iter().map(|n| self.display_name(n)).collect())
            .collect())
    }

    async fn get_existing_artifact(&self, id: &NodeId) -> CgResult<Option<Artifact>> {
        Ok(self.artifacts.get(id).map(|e| e.value().as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::NodeKind;

    fn function(id: &str) -> SourceNode {
        SourceNode::new(id, id, format!("src/{}.py", id)).with_kind(NodeKind::Function)
    }

    fn id(s: &str) -> NodeId {
        s.to_string()
    }

    #[tokio::test]
    async fn lookup_by_path_and_children_by_edge_type() {
        let g = LockFreeAdjacencyGraph::new();
        g.add_node(SourceNode::new("dir", "src", "src").with_kind(NodeKind::Folder));
        g.add_node(function("a"));
        g.add_node(function("b"));
        g.add_edge(&id("dir"), &id("a"), EdgeType::Contains);
        g.add_edge(&id("dir"), &id("b"), EdgeType::Contains);
        g.add_edge(&id("dir"), &id("a"), EdgeType::Contains);
        g.add_edge(&id("a"), &id("b"), EdgeType::Calls);

        let root = g.get_node_by_path("src").await.unwrap().unwrap();
        assert_eq!(root.id, "dir");

        let contained: Vec<_> = g
            .get_containment_children(&id("dir"))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(contained, vec!["a", "b"]);
        assert!(g.get_call_graph_children(&id("dir")).await.unwrap().is_empty());
        assert_eq!(g.neighbors(&id("a"), EdgeType::Calls), vec![id("b")]);
        assert!(g.get_node_by_path("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn children_of_unknown_node_is_an_error() {
        let g = LockFreeAdjacencyGraph::new();
        let err = g.get_containment_children(&id("ghost")).await.unwrap_err();
        assert!(matches!(err, CodeGraphError::NodeNotFound(n) if n == "ghost"));
    }

    #[tokio::test]
    async fn dangling_edge_yields_unresolved_child() {
        let g = LockFreeAdjacencyGraph::new();
        g.add_node(SourceNode::new("pkg", "pkg", "pkg").with_kind(NodeKind::Folder));
        g.add_node(function("a"));
        g.add_edge(&id("pkg"), &id("a"), EdgeType::Contains);
        g.add_edge(&id("pkg"), &id("ghost"), EdgeType::Contains);

        let children = g.get_containment_children(&id("pkg")).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], SourceNode::unresolved("ghost"));
        assert!(children[1].kinds.is_empty());
        assert!(g.get_containment_children(&id("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn cycles_are_reported_as_closed_name_paths() {
        let g = LockFreeAdjacencyGraph::new();
        for f in ["f1", "f2", "f3", "g"] {
            g.add_node(function(f));
        }
        g.add_edge(&id("f1"), &id("f2"), EdgeType::Calls);
        g.add_edge(&id("f2"), &id("f3"), EdgeType::Calls);
        g.add_edge(&id("f3"), &id("f1"), EdgeType::Calls);
        g.add_edge(&id("f2"), &id("g"), EdgeType::Calls);

        let cycles = g.detect_cycles(&id("f1")).await.unwrap();
        assert_eq!(cycles, vec![vec!["f1", "f2", "f3", "f1"]]);
        assert!(g.detect_cycles(&id("g")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_recursion_is_a_cycle() {
        let g = LockFreeAdjacencyGraph::new();
        g.add_node(function("fact"));
        g.add_edge(&id("fact"), &id("fact"), EdgeType::Calls);
        assert_eq!(g.detect_cycles(&id("fact")).await.unwrap(), vec![vec!["fact", "fact"]]);
    }

    #[tokio::test]
    async fn stored_artifacts_are_returned() {
        let g = LockFreeAdjacencyGraph::new();
        g.add_node(function("a"));
        assert!(g.get_existing_artifact(&id("a")).await.unwrap().is_none());
        g.store_artifact(Artifact::leaf("a", "old docs"));
        let found = g.get_existing_artifact(&id("a")).await.unwrap().unwrap();
        assert_eq!(found.text, "old docs");
    }

    #[test]
    fn concurrent_edge_inserts_are_not_lost() {
        let g = Arc::new(LockFreeAdjacencyGraph::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        g.add_edge(&id("hub"), &format!("n{}-{}", t, i), EdgeType::Contains);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(g.neighbors(&id("hub"), EdgeType::Contains).len(), 400);
    }
}
