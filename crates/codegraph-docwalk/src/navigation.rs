//! Child resolution for the walk.
//!
//! Callable units (functions, methods) are navigated through call edges;
//! everything else through containment. Call-graph children already on the
//! current worker's path are not followed; they come back as recursive calls.

use crate::worker::WorkerContext;
use codegraph_core::{GraphStore, NodeId, Result, SourceNode};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationKind {
    Containment,
    CallGraph,
}

impl NavigationKind {
    pub fn for_node(node: &SourceNode) -> Self {
        if node.is_callable() {
            NavigationKind::CallGraph
        } else {
            NavigationKind::Containment
        }
    }
}

impl fmt::Display for NavigationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationKind::Containment => f.write_str("containment"),
            NavigationKind::CallGraph => f.write_str("call_graph"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Navigation {
    pub kind: NavigationKind,
    /// Children to follow, in store order without duplicates.
    pub children: Vec<SourceNode>,
    /// Call-graph children skipped because they are on the worker's path.
    pub recursive_calls: Vec<SourceNode>,
}

impl Navigation {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn recursive_call_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.recursive_calls.iter().map(|n| &n.id)
    }
}

#[derive(Clone)]
pub struct NavigationResolver {
    store: Arc<dyn GraphStore>,
}

impl NavigationResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, node: &SourceNode, ctx: &WorkerContext) -> Result<Navigation> {
        let kind = NavigationKind::for_node(node);
        let children = match kind {
            NavigationKind::Containment => self.store.get_containment_children(&node.id).await?,
            NavigationKind::CallGraph => self.store.get_call_graph_children(&node.id).await?,
        };
        Ok(Self::split(kind, children, ctx))
    }

    /// Dedupe `children` and, for call-graph navigation, move the ones on the
    /// worker's path into `recursive_calls`.
    pub fn split(
        kind: NavigationKind,
        children: Vec<SourceNode>,
        ctx: &WorkerContext,
    ) -> Navigation {
        let mut seen = HashSet::new();
        let mut followed = Vec::with_capacity(children.len());
        let mut recursive = Vec::new();

        for child in children {
            if !seen.insert(child.id.clone()) {
                continue;
            }
            if kind == NavigationKind::CallGraph && ctx.on_path(&child.id) {
                recursive.push(child);
            } else {
                followed.push(child);
            }
        }

        Navigation {
            kind,
            children: followed,
            recursive_calls: recursive,
        }
    }
}
