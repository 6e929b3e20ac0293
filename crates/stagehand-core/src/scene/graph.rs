//! Node arena with hierarchy, transforms and hit testing.

use super::{DirtyState, Node, NodeId, NodeKind, SceneDirectory, StructuralError};
use kurbo::{Affine, Point, Size};

/// Determinants below this are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// A scene: the root node, every node reachable from it and any detached
/// nodes that have not been destroyed yet.
///
/// The graph owns all node storage through its [`SceneDirectory`]. Children are
/// owned by their parent in the sense that destroying a node destroys its whole
/// subtree; detaching (`remove_child`) only unlinks.
#[derive(Debug, Clone)]
pub struct SceneGraph {
    directory: SceneDirectory,
    /// Destroy directives queued since the last `take_removed`.
    removed: Vec<NodeId>,
}

impl SceneGraph {
    /// New scene whose root covers `world`.
    pub fn new(world: Size) -> Self {
        let mut directory = SceneDirectory::new();
        let mut root = Node::new(NodeId::ROOT, NodeKind::Plain);
        root.size = world;
        // Fresh directory, the root id cannot collide.
        let _ = directory.register(root);
        Self {
            directory,
            removed: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn directory(&self) -> &SceneDirectory {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.directory.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.directory.get_mut(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.directory.contains(id)
    }

    /// Create a detached node. It starts fully dirty.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = self.directory.allocate_id();
        // Freshly allocated ids are never live.
        let _ = self.directory.register(Node::new(id, kind));
        log::debug!("Created node {}", id);
        id
    }

    /// Create a node and append it to `parent`.
    pub fn create_child(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, StructuralError> {
        if !self.directory.contains(parent) {
            return Err(StructuralError::UnknownNode(parent));
        }
        let id = self.create(kind);
        self.add_child(parent, id)?;
        Ok(id)
    }

    /// Register a node under an id chosen by a peer. The node starts clean.
    pub(crate) fn insert_remote(&mut self, id: NodeId, kind: NodeKind) -> Result<(), StructuralError> {
        let mut node = Node::new(id, kind);
        node.clear_dirty();
        self.directory.register(node)
    }

    /// Append `child` to `parent`, detaching it from any previous parent first.
    /// Adding a child that is already present is a no-op.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), StructuralError> {
        if self.is_child_of(child, parent) {
            return Ok(());
        }
        self.link(parent, child, None)?;
        self.mark_children(parent);
        Ok(())
    }

    /// Unlink `child` from `parent` without destroying it.
    /// Returns `false` when `child` was not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.is_child_of(child, parent) {
            return false;
        }
        self.unlink(child);
        self.mark(child, DirtyState::PARENT);
        true
    }

    /// Reparent `child`, or detach it with `None`.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<(), StructuralError> {
        match parent {
            Some(parent) => self.add_child(parent, child),
            None => {
                let node = self.directory.get(child).ok_or(StructuralError::UnknownNode(child))?;
                if let Some(current) = node.parent {
                    self.remove_child(current, child);
                }
                Ok(())
            }
        }
    }

    /// Attach on behalf of a peer: same checks as `add_child`, explicit sibling
    /// index, no dirty marking.
    pub(crate) fn attach_remote(
        &mut self,
        child: NodeId,
        parent: Option<NodeId>,
        index: usize,
    ) -> Result<(), StructuralError> {
        match parent {
            Some(parent) if !parent.is_empty() => self.link(parent, child, Some(index)),
            _ => {
                if child == NodeId::ROOT {
                    // The root never has a parent on either side.
                    return Ok(());
                }
                if !self.directory.contains(child) {
                    return Err(StructuralError::UnknownNode(child));
                }
                self.unlink(child);
                Ok(())
            }
        }
    }

    fn is_child_of(&self, child: NodeId, parent: NodeId) -> bool {
        self.directory
            .get(child)
            .is_some_and(|node| node.parent == Some(parent))
    }

    fn link(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<(), StructuralError> {
        if child == NodeId::ROOT {
            return Err(StructuralError::RootLocked);
        }
        if !self.directory.contains(child) {
            return Err(StructuralError::UnknownNode(child));
        }
        if !self.directory.contains(parent) {
            return Err(StructuralError::UnknownNode(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(StructuralError::Cycle { child, parent });
        }

        self.unlink(child);
        if let Some(parent_node) = self.directory.get_mut(parent) {
            let index = index.unwrap_or(parent_node.children.len()).min(parent_node.children.len());
            parent_node.children.insert(index, child);
        }
        if let Some(child_node) = self.directory.get_mut(child) {
            child_node.parent = Some(parent);
            child_node.invalidate();
        }
        Ok(())
    }

    fn unlink(&mut self, child: NodeId) {
        let Some(parent) = self.directory.get_mut(child).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.directory.get_mut(parent) {
            parent_node.children.retain(|&id| id != child);
        }
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.directory.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn mark(&mut self, id: NodeId, group: DirtyState) {
        if let Some(node) = self.directory.get_mut(id) {
            node.mark(group);
        }
    }

    /// Mark the parent group of every child of `parent`. Replicas insert each
    /// record at its final sibling index, front to back, which only rebuilds
    /// the order when the whole list is rewritten.
    fn mark_children(&mut self, parent: NodeId) {
        let children = self
            .directory
            .get(parent)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in children {
            self.mark(child, DirtyState::PARENT);
        }
    }

    /// Detach and destroy every child of `id` along with their subtrees.
    pub fn clear_children(&mut self, id: NodeId) -> Result<(), StructuralError> {
        let node = self.directory.get_mut(id).ok_or(StructuralError::UnknownNode(id))?;
        let children = std::mem::take(&mut node.children);
        for child in children {
            if let Some(child_node) = self.directory.get_mut(child) {
                child_node.parent = None;
            }
            self.destroy_node(child, true);
        }
        Ok(())
    }

    /// Destroy `id` and its subtree, detaching it from its parent.
    pub fn remove(&mut self, id: NodeId) -> Result<(), StructuralError> {
        self.detach_and_destroy(id, true)
    }

    /// Destroy on behalf of a peer. Nothing is queued for the next flush.
    pub(crate) fn remove_remote(&mut self, id: NodeId) -> Result<(), StructuralError> {
        self.detach_and_destroy(id, false)
    }

    fn detach_and_destroy(&mut self, id: NodeId, record: bool) -> Result<(), StructuralError> {
        if id == NodeId::ROOT {
            return Err(StructuralError::RootLocked);
        }
        if !self.directory.contains(id) {
            return Err(StructuralError::UnknownNode(id));
        }
        self.unlink(id);
        self.destroy_node(id, record);
        Ok(())
    }

    /// Unregister `id` and everything below it. When `record` is set the id is
    /// queued as a destroy directive for the next flush, followed by every
    /// descendant whose parent changed since then: a replica still holds those
    /// under their old parent.
    pub(crate) fn destroy_node(&mut self, id: NodeId, record: bool) {
        let Some(node) = self.directory.unregister(id) else {
            return;
        };
        log::debug!("Destroyed node {}", id);
        if record {
            self.removed.push(id);
        }
        self.destroy_descendants(node.children, record);
    }

    fn destroy_descendants(&mut self, children: Vec<NodeId>, record: bool) {
        for child in children {
            let Some(node) = self.directory.unregister(child) else {
                continue;
            };
            if record && node.dirty().has(DirtyState::PARENT) {
                self.removed.push(child);
            }
            self.destroy_descendants(node.children, record);
        }
    }

    /// Destroy directives queued since the last call.
    pub fn take_removed(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.removed)
    }

    /// Put directives taken by `take_removed` back ahead of any queued since,
    /// e.g. when the batch carrying them could not be sent.
    pub fn requeue_removed(&mut self, mut ids: Vec<NodeId>) {
        ids.append(&mut self.removed);
        self.removed = ids;
    }

    /// Move `id` to the end of its parent's draw order.
    pub fn send_to_front(&mut self, id: NodeId) {
        self.reorder(id, |children, child| children.push(child));
    }

    /// Move `id` to the start of its parent's draw order.
    pub fn send_to_back(&mut self, id: NodeId) {
        self.reorder(id, |children, child| children.insert(0, child));
    }

    fn reorder(&mut self, id: NodeId, place: impl FnOnce(&mut Vec<NodeId>, NodeId)) {
        let Some(parent) = self.directory.get(id).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_node) = self.directory.get_mut(parent) {
            parent_node.children.retain(|&c| c != id);
            place(&mut parent_node.children, id);
        }
        self.mark_children(parent);
    }

    /// Children of `id` in draw order: insertion order, or ascending z-level
    /// (stable) when the node is draw-sorted.
    pub fn draw_order(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.directory.get(id) else {
            return Vec::new();
        };
        let mut children = node.children.clone();
        if node.draw_sorted {
            let z = |c: &NodeId| self.directory.get(*c).map_or(0.0, |n| n.z_level);
            children.sort_by(|a, b| z(a).total_cmp(&z(b)));
        }
        children
    }

    /// Composition of every ancestor's local transform with the node's own.
    pub fn global_transform(&self, id: NodeId) -> Option<Affine> {
        let node = self.directory.get(id)?;
        let mut transform = node.local_transform();
        let mut current = node.parent;
        while let Some(parent_id) = current {
            let parent = self.directory.get(parent_id)?;
            transform = parent.local_transform() * transform;
            current = parent.parent;
        }
        Some(transform)
    }

    /// Map a global point into `id`'s local space. `None` for unknown or
    /// degenerate (zero-scale) nodes.
    pub fn global_to_local(&self, id: NodeId, point: Point) -> Option<Point> {
        let transform = self.global_transform(id)?;
        if transform.determinant().abs() < SINGULAR_EPSILON {
            return None;
        }
        Some(transform.inverse() * point)
    }

    pub fn local_to_global(&self, id: NodeId, point: Point) -> Option<Point> {
        Some(self.global_transform(id)? * point)
    }

    /// Whether the global `point` lies inside the node's transformed quad.
    pub fn contains(&self, id: NodeId, point: Point) -> bool {
        let (Some(node), Some(transform)) = (self.directory.get(id), self.global_transform(id)) else {
            return false;
        };
        let size = node.size;
        if size.width <= 0.0 || size.height <= 0.0 {
            return false;
        }
        let origin = transform * Point::ZERO;
        let edge_x = transform * Point::new(size.width, 0.0) - origin;
        let edge_y = transform * Point::new(0.0, size.height) - origin;
        let offset = point - origin;

        let along_x = offset.dot(edge_x);
        let along_y = offset.dot(edge_y);
        (0.0..=edge_x.dot(edge_x)).contains(&along_x) && (0.0..=edge_y.dot(edge_y)).contains(&along_y)
    }

    /// Topmost enabled node under the global `point`, searching from the root.
    pub fn hit_test(&self, point: Point) -> Option<NodeId> {
        self.hit_from(NodeId::ROOT, point)
    }

    /// Topmost enabled node under `point` within the subtree of `id`.
    /// Descendants win over their ancestor; later siblings win over earlier ones.
    pub fn hit_from(&self, id: NodeId, point: Point) -> Option<NodeId> {
        let node = self.directory.get(id)?;
        if !node.visible {
            return None;
        }
        for child in self.draw_order(id).into_iter().rev() {
            if let Some(hit) = self.hit_from(child, point) {
                return Some(hit);
            }
        }
        (node.enabled && self.contains(id, point)).then_some(id)
    }

    /// Pre-order ids of the subtree rooted at `id`, children in stored order.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.directory.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Dirty nodes in the order a flush writes them: the root's subtree in
    /// pre-order, then every detached subtree (by ascending id of its top node).
    pub fn flush_order(&self) -> Vec<NodeId> {
        let mut order = self.preorder(NodeId::ROOT);
        for id in self.directory.ids() {
            let detached = id != NodeId::ROOT && self.directory.get(id).is_some_and(|n| n.parent.is_none());
            if detached {
                order.extend(self.preorder(id));
            }
        }
        order.retain(|id| self.directory.get(*id).is_some_and(Node::is_dirty));
        order
    }

    /// Re-mark every node fully dirty so the next flush rebuilds a whole scene.
    pub fn mark_all_dirty(&mut self) {
        for node in self.directory.nodes_mut() {
            node.mark_all_dirty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Vec2;

    fn graph() -> SceneGraph {
        SceneGraph::new(Size::new(1920.0, 1080.0))
    }

    fn clean(graph: &mut SceneGraph, id: NodeId) {
        graph.node_mut(id).unwrap().clear_dirty();
    }

    fn assert_affine_eq(a: Affine, b: Affine) {
        for (x, y) in a.as_coeffs().iter().zip(b.as_coeffs()) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    fn boxed(graph: &mut SceneGraph, parent: NodeId, origin: Point, size: f64) -> NodeId {
        let id = graph.create_child(parent, NodeKind::Plain).unwrap();
        let node = graph.node_mut(id).unwrap();
        node.set_position(origin);
        node.set_size(Size::new(size, size));
        node.set_enabled(true);
        id
    }

    #[test]
    fn test_add_child_is_idempotent() {
        let mut graph = graph();
        let child = graph.create(NodeKind::Plain);
        graph.add_child(graph.root(), child).unwrap();
        graph.add_child(graph.root(), child).unwrap();

        assert_eq!(graph.node(graph.root()).unwrap().children(), &[child]);
    }

    #[test]
    fn test_reparent_detaches_first() {
        let mut graph = graph();
        let root = graph.root();
        let a = graph.create_child(root, NodeKind::Plain).unwrap();
        let b = graph.create_child(root, NodeKind::Plain).unwrap();
        let c = graph.create_child(a, NodeKind::Plain).unwrap();

        graph.set_parent(c, Some(b)).unwrap();

        assert!(graph.node(a).unwrap().children().is_empty());
        assert_eq!(graph.node(b).unwrap().children(), &[c]);
        assert_eq!(graph.node(c).unwrap().parent(), Some(b));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let b = graph.create_child(a, NodeKind::Plain).unwrap();

        assert_eq!(
            graph.add_child(b, a),
            Err(StructuralError::Cycle { child: a, parent: b })
        );
        assert_eq!(graph.add_child(a, a), Err(StructuralError::Cycle { child: a, parent: a }));
    }

    #[test]
    fn test_remove_child_only_detaches() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        assert!(graph.remove_child(graph.root(), a));
        assert!(!graph.remove_child(graph.root(), a));
        assert!(graph.contains_node(a));
        assert_eq!(graph.node(a).unwrap().parent(), None);
    }

    #[test]
    fn test_clear_children_destroys_subtree() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let b = graph.create_child(a, NodeKind::Plain).unwrap();
        let c = graph.create_child(b, NodeKind::Plain).unwrap();
        let d = graph.create_child(a, NodeKind::Plain).unwrap();

        graph.clear_children(a).unwrap();

        assert!(graph.contains_node(a));
        for id in [b, c, d] {
            assert!(!graph.contains_node(id));
        }
        assert!(graph.node(a).unwrap().children().is_empty());
        // c was never flushed, so it has its own directive.
        assert_eq!(graph.take_removed(), vec![b, c, d]);
    }

    #[test]
    fn test_remove_root_refused() {
        let mut graph = graph();
        assert_eq!(graph.remove(graph.root()), Err(StructuralError::RootLocked));
        assert_eq!(graph.remove(NodeId(99)), Err(StructuralError::UnknownNode(NodeId(99))));
    }

    #[test]
    fn test_mutating_destroyed_node_is_noop() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        graph.remove(a).unwrap();

        assert!(graph.node_mut(a).is_none());
        assert_eq!(graph.add_child(graph.root(), a), Err(StructuralError::UnknownNode(a)));
    }

    #[test]
    fn test_three_level_transform_composition() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let b = graph.create_child(a, NodeKind::Plain).unwrap();
        let c = graph.create_child(b, NodeKind::Plain).unwrap();

        let setup = [
            (a, Point::new(100.0, 50.0), 30.0, Vec2::new(2.0, 2.0)),
            (b, Point::new(-20.0, 10.0), -45.0, Vec2::new(0.5, 1.5)),
            (c, Point::new(5.0, 5.0), 90.0, Vec2::new(3.0, 1.0)),
        ];
        let mut expected = Affine::IDENTITY;
        for (id, position, rotation, scale) in setup {
            let node = graph.node_mut(id).unwrap();
            node.set_position(position);
            node.set_rotation(rotation);
            node.set_scale(scale);
            expected = expected
                * Affine::translate(position.to_vec2())
                * Affine::rotate(rotation.to_radians())
                * Affine::scale_non_uniform(scale.x, scale.y);
        }

        assert_affine_eq(graph.global_transform(c).unwrap(), expected);
    }

    #[test]
    fn test_global_transform_tracks_parent_changes() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let b = graph.create_child(a, NodeKind::Plain).unwrap();
        let _ = graph.global_transform(b);

        graph.node_mut(a).unwrap().set_position(Point::new(10.0, 20.0));

        assert_eq!(graph.local_to_global(b, Point::ZERO), Some(Point::new(10.0, 20.0)));
    }

    #[test]
    fn test_global_local_roundtrip() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let node = graph.node_mut(a).unwrap();
        node.set_position(Point::new(40.0, 60.0));
        node.set_rotation(33.0);
        node.set_uniform_scale(1.7);

        let global = Point::new(123.0, -45.0);
        let local = graph.global_to_local(a, global).unwrap();
        let back = graph.local_to_global(a, local).unwrap();
        assert!((back - global).hypot() < 1e-9);
    }

    #[test]
    fn test_global_to_local_singular() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        graph.node_mut(a).unwrap().set_uniform_scale(0.0);
        assert_eq!(graph.global_to_local(a, Point::ZERO), None);
    }

    #[test]
    fn test_contains_rotated_quad() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let node = graph.node_mut(a).unwrap();
        node.set_size(Size::new(100.0, 10.0));
        node.set_rotation(90.0);

        // After a 90° turn the bar spans x in -10..0 and y in 0..100.
        assert!(graph.contains(a, Point::new(-5.0, 50.0)));
        assert!(!graph.contains(a, Point::new(50.0, 5.0)));
    }

    #[test]
    fn test_hit_topmost_sibling_wins() {
        let mut graph = graph();
        let root = graph.root();
        let below = boxed(&mut graph, root, Point::ZERO, 100.0);
        let above = boxed(&mut graph, root, Point::new(50.0, 50.0), 100.0);

        assert_eq!(graph.hit_test(Point::new(75.0, 75.0)), Some(above));
        assert_eq!(graph.hit_test(Point::new(25.0, 25.0)), Some(below));
        assert_eq!(graph.hit_test(Point::new(500.0, 500.0)), None);
    }

    #[test]
    fn test_hit_draw_sorted_uses_z_level() {
        let mut graph = graph();
        let root = graph.root();
        graph.node_mut(root).unwrap().set_draw_sorted(true);
        let first = boxed(&mut graph, root, Point::ZERO, 100.0);
        let second = boxed(&mut graph, root, Point::ZERO, 100.0);
        graph.node_mut(first).unwrap().set_z_level(5.0);

        assert_eq!(graph.draw_order(root), vec![second, first]);
        assert_eq!(graph.hit_test(Point::new(10.0, 10.0)), Some(first));
    }

    #[test]
    fn test_hit_descendant_before_parent_and_skip_hidden() {
        let mut graph = graph();
        let root = graph.root();
        let parent = boxed(&mut graph, root, Point::ZERO, 100.0);
        let child = boxed(&mut graph, parent, Point::new(10.0, 10.0), 20.0);

        assert_eq!(graph.hit_test(Point::new(15.0, 15.0)), Some(child));

        graph.node_mut(child).unwrap().set_visible(false);
        assert_eq!(graph.hit_test(Point::new(15.0, 15.0)), Some(parent));

        graph.node_mut(child).unwrap().set_visible(true);
        graph.node_mut(child).unwrap().set_enabled(false);
        assert_eq!(graph.hit_test(Point::new(15.0, 15.0)), Some(parent));
    }

    #[test]
    fn test_flush_order_parents_first_then_detached() {
        let mut graph = graph();
        let root = graph.root();
        let loose_child = graph.create(NodeKind::Plain);
        let a = graph.create_child(root, NodeKind::Plain).unwrap();
        let b = graph.create_child(a, NodeKind::Plain).unwrap();
        let loose_parent = graph.create(NodeKind::Plain);
        graph.add_child(loose_parent, loose_child).unwrap();

        assert_eq!(graph.flush_order(), vec![root, a, b, loose_parent, loose_child]);

        for id in [root, a, b, loose_parent, loose_child] {
            clean(&mut graph, id);
        }
        assert!(graph.flush_order().is_empty());

        graph.mark_all_dirty();
        assert_eq!(graph.flush_order().len(), 5);
    }

    #[test]
    fn test_send_to_front_marks_parent_group() {
        let mut graph = graph();
        let root = graph.root();
        let a = graph.create_child(root, NodeKind::Plain).unwrap();
        let b = graph.create_child(root, NodeKind::Plain).unwrap();
        clean(&mut graph, a);

        graph.send_to_front(a);

        assert_eq!(graph.node(root).unwrap().children(), &[b, a]);
        assert!(graph.node(a).unwrap().dirty().has(DirtyState::PARENT));
    }

    #[test]
    fn test_reorder_marks_every_sibling() {
        let mut graph = graph();
        let root = graph.root();
        let a = graph.create_child(root, NodeKind::Plain).unwrap();
        let b = graph.create_child(root, NodeKind::Plain).unwrap();
        let c = graph.create_child(root, NodeKind::Plain).unwrap();
        for id in [root, a, b, c] {
            clean(&mut graph, id);
        }

        graph.send_to_back(c);

        assert_eq!(graph.node(root).unwrap().children(), &[c, a, b]);
        assert_eq!(graph.flush_order(), vec![c, a, b]);
    }

    #[test]
    fn test_destroy_queues_moved_descendants() {
        let mut graph = graph();
        let root = graph.root();
        let p = graph.create_child(root, NodeKind::Plain).unwrap();
        let x = graph.create_child(root, NodeKind::Plain).unwrap();
        let y = graph.create_child(x, NodeKind::Plain).unwrap();
        let stay = graph.create_child(p, NodeKind::Plain).unwrap();
        for id in [root, p, x, y, stay] {
            clean(&mut graph, id);
        }

        graph.add_child(p, x).unwrap();
        graph.remove(p).unwrap();

        // Appending x re-marked stay too. y goes with x.
        assert_eq!(graph.take_removed(), vec![p, stay, x]);
        assert!(!graph.contains_node(y));
    }

    #[test]
    fn test_requeue_removed_keeps_order() {
        let mut graph = graph();
        let a = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let b = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        graph.remove(a).unwrap();
        let taken = graph.take_removed();
        graph.remove(b).unwrap();

        graph.requeue_removed(taken);

        assert_eq!(graph.take_removed(), vec![a, b]);
    }
}
