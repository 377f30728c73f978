//! Connected-node registry backing `/api/nodes` and `/api/stats`.
//!
//! A node is "connected" for as long as at least one TCP line-stream has
//! declared that name, added on first sight and discarded on disconnect.

use std::collections::HashSet;
use std::sync::Arc;

use domain::NodeName;
use parking_lot::RwLock;

/// Shared set of currently connected node names.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<HashSet<NodeName>>>,
}

impl NodeRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node as connected.
    pub fn connect(&self, node: NodeName) {
        self.nodes.write().insert(node);
    }

    /// Mark a node as disconnected.
    pub fn disconnect(&self, node: &NodeName) {
        self.nodes.write().remove(node);
    }

    /// Snapshot of currently connected node names.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeName> {
        self.nodes.read().iter().cloned().collect()
    }

    /// Number of currently connected nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether no node is currently connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}
