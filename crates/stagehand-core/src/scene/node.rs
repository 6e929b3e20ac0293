//! Scene node: local transform, flags and replicable attributes.

use super::{DirtyState, KindId, NodeColor, NodeId, NodeKind};
use crate::touch::TouchCapabilities;
use kurbo::{Affine, Point, Rect, Size, Vec2};
use std::cell::Cell;

/// Rotation changes smaller than this (in degrees) are ignored.
const ROTATION_EPSILON: f64 = 0.0001;

/// A visual element of the scene graph.
///
/// Nodes live in the [`SceneGraph`](super::SceneGraph) arena and refer to each
/// other by id only: the graph owns storage, `children` lists the owned subtree
/// in draw order, and `parent` is a back-reference never used for teardown.
///
/// Every setter marks the matching [`DirtyState`] group and invalidates the
/// cached local matrix. Rotation is in degrees; `center` is expressed in the
/// unit square of `size` (0.5, 0.5 rotates around the middle).
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) position: Point,
    pub(crate) scale: Vec2,
    pub(crate) rotation: f64,
    pub(crate) center: Point,
    pub(crate) size: Size,
    pub(crate) opacity: f64,
    pub(crate) color: NodeColor,
    pub(crate) visible: bool,
    pub(crate) enabled: bool,
    pub(crate) transparent: bool,
    pub(crate) draw_sorted: bool,
    pub(crate) z_level: f64,
    pub(crate) kind: NodeKind,
    pub(crate) dirty: DirtyState,
    /// Which gestures this node reacts to. Logic-side only, never replicated.
    pub touch: TouchCapabilities,
    local_transform: Cell<Option<Affine>>,
}

impl Node {
    /// A fresh node with every attribute group dirty, so its first flush is a
    /// full construction record.
    pub(crate) fn new(id: NodeId, mut kind: NodeKind) -> Self {
        kind.mark_all_dirty();
        Self {
            id,
            parent: None,
            children: Vec::new(),
            position: Point::ZERO,
            scale: Vec2::new(1.0, 1.0),
            rotation: 0.0,
            center: Point::ZERO,
            size: Size::ZERO,
            opacity: 1.0,
            color: NodeColor::white(),
            visible: true,
            enabled: false,
            transparent: true,
            draw_sorted: false,
            z_level: 0.0,
            kind,
            dirty: DirtyState::BASE,
            touch: TouchCapabilities::default(),
            local_transform: Cell::new(None),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Owned children in draw order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable access to the kind payload. Kind setters track their own dirty bits.
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn kind_id(&self) -> KindId {
        self.kind.id()
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
        self.mark(DirtyState::POSITION);
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.set_position(self.position + delta);
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
        self.mark(DirtyState::SCALE);
    }

    pub fn set_uniform_scale(&mut self, scale: f64) {
        self.set_scale(Vec2::new(scale, scale));
    }

    /// Rotation in degrees.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        if (degrees - self.rotation).abs() < ROTATION_EPSILON {
            return;
        }
        self.rotation = degrees;
        self.mark(DirtyState::ROTATION);
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn set_center(&mut self, center: Point) {
        self.center = center;
        self.mark(DirtyState::CENTER);
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
        self.mark(DirtyState::SIZE);
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity;
        self.mark(DirtyState::OPACITY);
    }

    pub fn color(&self) -> NodeColor {
        self.color
    }

    pub fn set_color(&mut self, color: NodeColor) {
        self.color = color;
        self.mark(DirtyState::COLOR);
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.mark(DirtyState::FLAGS);
    }

    /// Enabled nodes take part in hit testing and receive touches.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.mark(DirtyState::FLAGS);
    }

    /// Transparent nodes skip their own draw but still draw children.
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
        self.mark(DirtyState::FLAGS);
    }

    /// When set, children are drawn and hit-tested in ascending z-level.
    pub fn is_draw_sorted(&self) -> bool {
        self.draw_sorted
    }

    pub fn set_draw_sorted(&mut self, draw_sorted: bool) {
        self.draw_sorted = draw_sorted;
        self.mark(DirtyState::FLAGS);
    }

    pub fn z_level(&self) -> f64 {
        self.z_level
    }

    pub fn set_z_level(&mut self, z_level: f64) {
        self.z_level = z_level;
        self.mark(DirtyState::Z_LEVEL);
    }

    /// Local-space rectangle covered by the node.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(Point::ZERO, self.size)
    }

    /// Base and kind dirty groups combined.
    pub fn dirty(&self) -> DirtyState {
        self.dirty | self.kind.dirty()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
        self.kind.clear_dirty();
    }

    /// Re-mark every attribute group, including construction.
    pub(crate) fn mark_all_dirty(&mut self) {
        self.dirty.insert(DirtyState::BASE);
        self.kind.mark_all_dirty();
    }

    pub(crate) fn mark(&mut self, group: DirtyState) {
        self.dirty.insert(group);
        if group.has(
            DirtyState::POSITION | DirtyState::SCALE | DirtyState::ROTATION | DirtyState::CENTER | DirtyState::SIZE,
        ) {
            self.invalidate();
        }
    }

    /// Drop the cached local matrix. Direct field writes must call this.
    pub(crate) fn invalidate(&self) {
        self.local_transform.set(None);
    }

    /// Local matrix: translate(position) · rotate · scale · translate(-center · size).
    pub fn local_transform(&self) -> Affine {
        if let Some(cached) = self.local_transform.get() {
            return cached;
        }
        let pivot = Vec2::new(self.center.x * self.size.width, self.center.y * self.size.height);
        let transform = Affine::translate(self.position.to_vec2())
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate(-pivot);
        self.local_transform.set(Some(transform));
        transform
    }

    /// Replicated state, for comparing a source node with its replica.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            parent: self.parent,
            children: self.children.clone(),
            position: self.position,
            scale: self.scale,
            rotation: self.rotation,
            center: self.center,
            size: self.size,
            opacity: self.opacity,
            color: self.color,
            visible: self.visible,
            enabled: self.enabled,
            transparent: self.transparent,
            draw_sorted: self.draw_sorted,
            z_level: self.z_level,
            kind: self.kind.clone(),
        }
    }
}

/// Every replicated attribute of a node.
///
/// Kind equality ignores transient state such as queued canvas strokes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub position: Point,
    pub scale: Vec2,
    pub rotation: f64,
    pub center: Point,
    pub size: Size,
    pub opacity: f64,
    pub color: NodeColor,
    pub visible: bool,
    pub enabled: bool,
    pub transparent: bool,
    pub draw_sorted: bool,
    pub z_level: f64,
    pub kind: NodeKind,
}
