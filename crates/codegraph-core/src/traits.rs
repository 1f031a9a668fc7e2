use crate::{Artifact, GenerationRequest, NodeId, Result, SourceNode};
use async_trait::async_trait;
use std::time::Duration;

/// Read access to the persistent source graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_node_by_path(&self, path: &str) -> Result<Option<SourceNode>>;

    async fn get_containment_children(&self, id: &NodeId) -> Result<Vec<SourceNode>>;

    async fn get_call_graph_children(&self, id: &NodeId) -> Result<Vec<SourceNode>>;

    /// Call cycles passing through `id`, each as a path of node names.
    async fn detect_cycles(&self, id: &NodeId) -> Result<Vec<Vec<String>>>;

    /// Artifact persisted by an earlier run, if any.
    async fn get_existing_artifact(&self, id: &NodeId) -> Result<Option<Artifact>>;
}

/// Turns a node and its children's artifacts into documentation text,
/// usually through a language model. Called concurrently from many workers.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> anyhow::Result<String>;

    /// Name used in logs.
    fn generator_name(&self) -> &str {
        "generator"
    }
}
