use crate::{Artifact, FallbackReason, SourceNode};
use std::fmt::Write as _;

/// Everything a generator needs to document one node.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub node: SourceNode,
    /// Artifacts of the children, in navigation order.
    pub child_artifacts: Vec<Artifact>,
    /// Names of call-graph children skipped because they are already being
    /// documented further up the same call chain.
    pub recursive_calls: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    /// Children with no artifact yet (fallback generation only).
    pub unavailable_children: usize,
    /// Set when this request produces a degraded artifact.
    pub fallback: Option<FallbackReason>,
}

impl GenerationRequest {
    pub fn new(node: SourceNode, child_artifacts: Vec<Artifact>) -> Self {
        Self {
            node,
            child_artifacts,
            recursive_calls: Vec::new(),
            cycles: Vec::new(),
            unavailable_children: 0,
            fallback: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.child_artifacts.is_empty()
    }

    /// Render the request as a markdown prompt for a language model.
    pub fn render_prompt(&self) -> String {
        let node = &self.node;
        let mut prompt = String::new();

        let _ = write!(
            prompt,
            "Document the {} `{}` at {}",
            node.kind_label(),
            node.name,
            node.path
        );
        if let (Some(start), Some(end)) = (node.start_line, node.end_line) {
            let _ = write!(prompt, " (lines {}-{})", start, end);
        }
        prompt.push_str(".\n\n## Source\n\n```\n");
        prompt.push_str(&node.content);
        if !node.content.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n");

        if !self.child_artifacts.is_empty() {
            let count = self.child_artifacts.len();
            let _ = write!(prompt, "\n## Documented dependencies ({})\n", count);
            for child in &self.child_artifacts {
                let _ = write!(prompt, "\n### {}\n\n{}\n", child.source_node_id, child.text);
            }
        }

        if !self.recursive_calls.is_empty() {
            prompt.push_str("\n## Recursive calls\n\n");
            for name in &self.recursive_calls {
                let _ = writeln!(prompt, "- recursive call to {}", name);
            }
        }

        if !self.cycles.is_empty() {
            prompt.push_str("\n## Call cycles\n\n");
            for cycle in &self.cycles {
                let _ = writeln!(prompt, "- {}", cycle.join(" -> "));
            }
        }

        if let Some(reason) = self.fallback {
            let _ = write!(
                prompt,
                "\nNote: produced in degraded mode ({}); \
                 {} dependencies could not be documented.\n",
                reason, self.unavailable_children
            );
        }

        prompt
    }
}
