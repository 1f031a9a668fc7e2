use crate::{NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A source entity (folder, file, class, function, ...) supplied by the graph
/// store. Read-only for the duration of a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNode {
    pub id: NodeId,
    pub name: String,
    pub path: String,
    pub kinds: BTreeSet<NodeKind>,
    #[serde(default)]
    pub content: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

impl SourceNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            kinds: BTreeSet::new(),
            content: String::new(),
            start_line: None,
            end_line: None,
        }
    }

    /// Stand-in for an edge target the store has no node for. It has no path
    /// and no kinds, and the walk records it as an error artifact.
    pub fn unresolved(id: impl Into<NodeId>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, "")
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    /// True when the node is a callable unit and not a container, i.e. its
    /// children are found through call-graph edges.
    pub fn is_callable(&self) -> bool {
        self.kinds.iter().any(NodeKind::is_callable)
            && !self.kinds.iter().any(NodeKind::is_container)
    }

    /// Human readable "kind kind" label, e.g. `"class"` or `"file module"`.
    pub fn kind_label(&self) -> String {
        if self.kinds.is_empty() {
            return "entity".to_string();
        }
        self.kinds
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
