use codegraph_concurrent::WorkerId;
use codegraph_core::NodeId;

/// Per-task state of one worker: its identity and the chain of nodes it is
/// currently computing on its own stack. Never shared between tasks.
#[derive(Debug)]
pub struct WorkerContext {
    id: WorkerId,
    path: Vec<NodeId>,
}

impl WorkerContext {
    pub fn new() -> Self {
        Self {
            id: WorkerId::next(),
            path: Vec::new(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn enter(&mut self, node: &NodeId) {
        self.path.push(node.clone());
    }

    /// Pop `node` off the path. Out-of-order leaves remove the innermost
    /// matching entry.
    pub fn leave(&mut self, node: &NodeId) {
        if self.path.last() == Some(node) {
            self.path.pop();
        } else if let Some(pos) = self.path.iter().rposition(|n| n == node) {
            self.path.remove(pos);
        }
    }

    pub fn on_path(&self, node: &NodeId) -> bool {
        self.path.contains(node)
    }

    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new()
    }
}
