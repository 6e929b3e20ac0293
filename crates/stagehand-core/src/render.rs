//! Draw hook boundary.
//!
//! The core never rasterizes. A [`RenderBackend`] receives each visible node
//! once per frame with its composed transform; [`draw`] walks the scene in
//! draw order and feeds it.

use crate::scene::{Node, NodeId, SceneGraph, Stroke};
use kurbo::Affine;

/// Backend supplied by the embedding application.
pub trait RenderBackend {
    /// Draw one non-transparent node. `opacity` already includes the ancestors'.
    fn draw_local(&mut self, node: &Node, transform: Affine, opacity: f64);

    /// Whether the texture at `path` is available.
    fn has_texture(&self, _path: &str) -> bool {
        true
    }

    /// Paint queued canvas strokes with the brush texture at `brush`.
    fn draw_strokes(&mut self, _node: &Node, _transform: Affine, _brush: &str, _strokes: &[Stroke]) {}
}

struct DrawItem {
    id: NodeId,
    transform: Affine,
    opacity: f64,
}

/// Draw the scene from the root. Queued canvas strokes are consumed.
pub fn draw(graph: &mut SceneGraph, backend: &mut impl RenderBackend) {
    let mut items = Vec::new();
    collect(graph, graph.root(), Affine::IDENTITY, 1.0, &mut items);

    for item in items {
        let strokes = graph
            .node_mut(item.id)
            .and_then(|node| node.kind_mut().as_canvas_mut())
            .map(|canvas| canvas.take_strokes())
            .unwrap_or_default();
        let Some(node) = graph.node(item.id) else {
            continue;
        };
        if !node.is_transparent() {
            backend.draw_local(node, item.transform, item.opacity);
        }
        if strokes.is_empty() {
            continue;
        }
        match node.kind().as_canvas().and_then(|c| c.brush_image()) {
            Some(brush) if backend.has_texture(brush) => {
                backend.draw_strokes(node, item.transform, brush, &strokes);
            }
            Some(brush) => log::warn!("Brush texture {} missing, skipping strokes of {}", brush, item.id),
            None => log::warn!("No brush image set, skipping strokes of {}", item.id),
        }
    }
}

fn collect(graph: &SceneGraph, id: NodeId, parent: Affine, parent_opacity: f64, items: &mut Vec<DrawItem>) {
    let Some(node) = graph.node(id) else {
        return;
    };
    if !node.is_visible() {
        return;
    }
    let transform = parent * node.local_transform();
    let opacity = parent_opacity * node.opacity();
    items.push(DrawItem { id, transform, opacity });
    for child in graph.draw_order(id) {
        collect(graph, child, transform, opacity, items);
    }
}
