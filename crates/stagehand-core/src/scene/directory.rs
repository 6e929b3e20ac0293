//! Id → node registry.

use super::{Node, NodeId, StructuralError};
use std::collections::HashMap;

/// Registry of every live node in one scene, keyed by id.
///
/// Owned by the [`SceneGraph`](super::SceneGraph); replication and hit testing
/// resolve ids through it. Ids are allocated monotonically and never reused.
#[derive(Debug, Clone)]
pub struct SceneDirectory {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
}

impl Default for SceneDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneDirectory {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: NodeId::ROOT.0 + 1,
        }
    }

    /// Hand out a fresh id.
    pub fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Make sure ids coming from a peer are never handed out locally.
    pub(crate) fn note_external_id(&mut self, id: NodeId) {
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
    }

    /// Register `node` under its id. An id that is already live is rejected.
    pub fn register(&mut self, node: Node) -> Result<(), StructuralError> {
        let id = node.id();
        if id.is_empty() {
            return Err(StructuralError::UnknownNode(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(StructuralError::DuplicateId(id));
        }
        self.note_external_id(id);
        self.nodes.insert(id, node);
        Ok(())
    }

    pub fn unregister(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live ids in ascending order.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }
}
