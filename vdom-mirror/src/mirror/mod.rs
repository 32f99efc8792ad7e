//! Identity index from stable node id to the virtual node built for it.
//!
//! The table holds no policy. The synchronizer decides when to register
//! and when to clear; one table exists per `Document`.

use crate::dom::NodeKey;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Mirror {
    nodes: HashMap<i32, NodeKey>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` under `id`, returning the node previously held there.
    pub fn register(&mut self, id: i32, node: NodeKey) -> Option<NodeKey> {
        self.nodes.insert(id, node)
    }

    pub fn lookup(&self, id: i32) -> Option<NodeKey> {
        self.nodes.get(&id).copied()
    }

    pub fn has(&self, id: i32) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn unregister(&mut self, id: i32) -> Option<NodeKey> {
        self.nodes.remove(&id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
