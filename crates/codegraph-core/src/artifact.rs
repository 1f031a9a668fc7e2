//! Documentation artifacts produced by the bottom-up walker.

use crate::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How an artifact came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    /// Generated from the node's own content, no children.
    Leaf,
    /// Generated from the node's content and its children's artifacts.
    Parent,
    /// Degraded result built from the children that were already available.
    FallbackPartial,
    /// Degraded result built from the node's content alone.
    FallbackLeaf,
    /// Generation failed; the text carries the error.
    ErrorFallback,
    /// Found in the persistent store before the walk touched the node.
    Cached,
}

/// Why a degraded artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackReason {
    Deadlock,
    Timeout,
    Error,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Deadlock => "deadlock",
            FallbackReason::Timeout => "timeout",
            FallbackReason::Error => "error",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub is_fallback: bool,
    pub fallback_reason: Option<FallbackReason>,
    /// Nodes reached again through call edges below (or at) this node.
    #[serde(default)]
    pub recursive_calls: BTreeSet<NodeId>,
    /// Named call cycles through this node, as reported by the graph store.
    #[serde(default)]
    pub cycles: Vec<Vec<String>>,
    /// Children whose artifacts were missing when a fallback was produced.
    #[serde(default)]
    pub unavailable_children: usize,
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl Default for ArtifactMetadata {
    fn default() -> Self {
        Self {
            is_fallback: false,
            fallback_reason: None,
            recursive_calls: BTreeSet::new(),
            cycles: Vec::new(),
            unavailable_children: 0,
            error: None,
            generated_at: Utc::now(),
        }
    }
}

/// The computed documentation of one source node. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub source_node_id: NodeId,
    pub text: String,
    pub kind: ArtifactKind,
    pub child_count: Option<usize>,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn new(
        source_node_id: impl Into<NodeId>,
        kind: ArtifactKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id: source_node_id.into(),
            text: text.into(),
            kind,
            child_count: None,
            metadata: ArtifactMetadata::default(),
        }
    }

    pub fn leaf(source_node_id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self::new(source_node_id, ArtifactKind::Leaf, text)
    }

    pub fn parent(
        source_node_id: impl Into<NodeId>,
        text: impl Into<String>,
        child_count: usize,
    ) -> Self {
        Self::new(source_node_id, ArtifactKind::Parent, text).with_child_count(child_count)
    }

    /// A degraded artifact. `kind` should be one of the fallback kinds.
    pub fn fallback(
        source_node_id: impl Into<NodeId>,
        kind: ArtifactKind,
        text: impl Into<String>,
        reason: FallbackReason,
    ) -> Self {
        let mut artifact = Self::new(source_node_id, kind, text);
        artifact.metadata.is_fallback = true;
        artifact.metadata.fallback_reason = Some(reason);
        artifact
    }

    /// Generation for the node failed; the walk goes on with this in its place.
    pub fn error_fallback(source_node_id: impl Into<NodeId>, error: impl Into<String>) -> Self {
        let source_node_id = source_node_id.into();
        let error = error.into();
        let text = format!("Documentation unavailable for {}: {}", source_node_id, error);
        let mut artifact = Self::fallback(
            source_node_id,
            ArtifactKind::ErrorFallback,
            text,
            FallbackReason::Error,
        );
        artifact.metadata.error = Some(error);
        artifact
    }

    pub fn with_child_count(mut self, child_count: usize) -> Self {
        self.child_count = Some(child_count);
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata.is_fallback
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        self.metadata.fallback_reason
    }
}
