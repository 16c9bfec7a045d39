/// Node type registry using ArcSwap
///
/// Maps node type identifiers to factories. Registration swaps the whole map
/// atomically, so lookups during running executions never block.

use crate::nodes::{builtin, Node};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Constructor for a node capability
pub type NodeFactory = Arc<dyn Fn() -> Arc<dyn Node> + Send + Sync>;

pub struct NodeRegistry {
    /// Key: node type, Value: factory producing a fresh instance
    factories: ArcSwap<HashMap<String, NodeFactory>>,
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Registry preloaded with the built-in node types
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_builtins(&registry);
        registry
    }

    /// Register (or replace) a node type
    pub fn register<F, N>(&self, node_type: impl Into<String>, factory: F)
    where
        F: Fn() -> N + Send + Sync + 'static,
        N: Node + 'static,
    {
        let node_type = node_type.into();
        let factory: NodeFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn Node>);

        self.factories.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(node_type.clone(), Arc::clone(&factory));
            next
        });

        tracing::debug!("🧩 Registered node type: {}", node_type);
    }

    /// Remove a node type, returning whether it was present
    pub fn unregister(&self, node_type: &str) -> bool {
        if !self.contains(node_type) {
            return false;
        }
        self.factories.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(node_type);
            next
        });
        true
    }

    /// Create a node instance for the given type
    pub fn create(&self, node_type: &str) -> Option<Arc<dyn Node>> {
        self.factories.load().get(node_type).map(|factory| factory())
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.load().contains_key(node_type)
    }

    /// Registered type identifiers, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.load().keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.types())
            .finish()
    }
}
