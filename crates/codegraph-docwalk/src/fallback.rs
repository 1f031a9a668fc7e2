//! Degraded artifacts for nodes that cannot be waited on.
//!
//! Used when waiting would deadlock or has timed out. Only results that are
//! already available are consulted; nothing here blocks on another worker.

use crate::generate::run_generator;
use crate::navigation::NavigationResolver;
use crate::worker::WorkerContext;
use codegraph_concurrent::NodeStations;
use codegraph_core::{
    Artifact, ArtifactGenerator, ArtifactKind, FallbackReason, GenerationRequest, NodeId,
    SourceNode,
};
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct FallbackComputer {
    navigation: NavigationResolver,
    generator: Arc<dyn ArtifactGenerator>,
    stations: Arc<NodeStations>,
    generation_timeout: Duration,
    cache: DashMap<NodeId, Artifact>,
}

impl FallbackComputer {
    pub fn new(
        navigation: NavigationResolver,
        generator: Arc<dyn ArtifactGenerator>,
        stations: Arc<NodeStations>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            navigation,
            generator,
            stations,
            generation_timeout,
            cache: DashMap::new(),
        }
    }

    /// Produce (or reuse) the fallback artifact for `node` and offer it to the
    /// node's station.
    pub async fn compute(
        &self,
        node: &SourceNode,
        reason: FallbackReason,
        ctx: &WorkerContext,
    ) -> Artifact {
        let cached = self.cache.get(&node.id).map(|e| e.value().clone());
        if let Some(artifact) = cached {
            debug!(node = %node.id, "Reusing fallback artifact");
            return artifact;
        }
        counter!("docwalk_fallbacks_total", "reason" => reason.as_str()).increment(1);

        let (children, recursive_calls) = match self.navigation.resolve(node, ctx).await {
            Ok(nav) => (nav.children, nav.recursive_calls),
            Err(e) => {
                warn!(
                    node = %node.id,
                    error = %e,
                    "Could not resolve children for fallback; treating as leaf"
                );
                (Vec::new(), Vec::new())
            }
        };

        let available: Vec<Artifact> = children
            .iter()
            .filter_map(|child| self.stations.peek(&child.id))
            .collect();
        let unavailable = children.len() - available.len();
        let kind = if available.is_empty() {
            ArtifactKind::FallbackLeaf
        } else {
            ArtifactKind::FallbackPartial
        };

        let mut request = GenerationRequest::new(node.clone(), available);
        request.recursive_calls = recursive_calls.iter().map(|n| n.name.clone()).collect();
        request.unavailable_children = unavailable;
        request.fallback = Some(reason);

        let generated =
            run_generator(self.generator.as_ref(), &request, self.generation_timeout).await;
        let mut artifact = match generated {
            Ok(text) => Artifact::fallback(&node.id, kind, text, reason),
            Err(e) => {
                warn!(
                    node = %node.id,
                    reason = %reason,
                    error = %e,
                    "Fallback generation failed; using source summary"
                );
                let text = summary(node, unavailable);
                let mut artifact = Artifact::fallback(&node.id, kind, text, reason);
                artifact.metadata.error = Some(e.to_string());
                artifact
            }
        };
        if kind == ArtifactKind::FallbackPartial {
            artifact.child_count = Some(request.child_artifacts.len());
        }
        artifact.metadata.unavailable_children = unavailable;
        artifact
            .metadata
            .recursive_calls
            .extend(recursive_calls.into_iter().map(|n| n.id));

        let artifact = self
            .cache
            .entry(node.id.clone())
            .or_insert(artifact)
            .value()
            .clone();
        if self.stations.offer_fallback(&node.id, artifact.clone()) {
            debug!(node = %node.id, reason = %reason, "Stored fallback as provisional result");
        }
        artifact
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

fn summary(node: &SourceNode, unavailable: usize) -> String {
    format!(
        "{} `{}` at {} (documentation degraded, {} dependencies unavailable)",
        node.kind_label(),
        node.name,
        node.path,
        unavailable
    )
}
