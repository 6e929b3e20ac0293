//! Closed set of node kinds.
//!
//! A node's kind is fixed when it is created and declares which kind-specific
//! attribute groups it carries. Each kind tracks its own dirty bits inside the
//! shared [`DirtyState::KIND`] range.

use super::{DirtyState, NodeColor};
use kurbo::Point;
use std::collections::VecDeque;

/// Upper bound on queued stroke segments before the oldest are dropped.
pub const DEFAULT_MAX_QUEUED_STROKES: usize = 100;

/// Discriminant of [`NodeKind`], used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindId {
    Plain,
    Gradient,
    DrawingCanvas,
    WebSurface,
}

impl KindId {
    pub fn name(self) -> &'static str {
        match self {
            KindId::Plain => "plain",
            KindId::Gradient => "gradient",
            KindId::DrawingCanvas => "drawing_canvas",
            KindId::WebSurface => "web_surface",
        }
    }

    /// Fresh, default-valued kind payload.
    pub fn construct(self) -> NodeKind {
        match self {
            KindId::Plain => NodeKind::Plain,
            KindId::Gradient => NodeKind::Gradient(Gradient::default()),
            KindId::DrawingCanvas => NodeKind::DrawingCanvas(DrawingCanvas::default()),
            KindId::WebSurface => NodeKind::WebSurface(WebSurface::default()),
        }
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeKind {
    #[default]
    Plain,
    Gradient(Gradient),
    DrawingCanvas(DrawingCanvas),
    WebSurface(WebSurface),
}

impl NodeKind {
    pub fn id(&self) -> KindId {
        match self {
            NodeKind::Plain => KindId::Plain,
            NodeKind::Gradient(_) => KindId::Gradient,
            NodeKind::DrawingCanvas(_) => KindId::DrawingCanvas,
            NodeKind::WebSurface(_) => KindId::WebSurface,
        }
    }

    pub fn dirty(&self) -> DirtyState {
        match self {
            NodeKind::Plain => DirtyState::EMPTY,
            NodeKind::Gradient(g) => g.dirty,
            NodeKind::DrawingCanvas(c) => c.dirty,
            NodeKind::WebSurface(w) => w.dirty,
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        if let Some(dirty) = self.dirty_mut() {
            dirty.clear();
        }
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        if let Some(dirty) = self.dirty_mut() {
            dirty.insert(DirtyState::KIND);
        }
    }

    fn dirty_mut(&mut self) -> Option<&mut DirtyState> {
        match self {
            NodeKind::Plain => None,
            NodeKind::Gradient(g) => Some(&mut g.dirty),
            NodeKind::DrawingCanvas(c) => Some(&mut c.dirty),
            NodeKind::WebSurface(w) => Some(&mut w.dirty),
        }
    }

    pub fn as_gradient(&self) -> Option<&Gradient> {
        match self {
            NodeKind::Gradient(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_gradient_mut(&mut self) -> Option<&mut Gradient> {
        match self {
            NodeKind::Gradient(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_canvas(&self) -> Option<&DrawingCanvas> {
        match self {
            NodeKind::DrawingCanvas(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_canvas_mut(&mut self) -> Option<&mut DrawingCanvas> {
        match self {
            NodeKind::DrawingCanvas(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_web(&self) -> Option<&WebSurface> {
        match self {
            NodeKind::WebSurface(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_web_mut(&mut self) -> Option<&mut WebSurface> {
        match self {
            NodeKind::WebSurface(w) => Some(w),
            _ => None,
        }
    }
}

/// Four-corner color gradient.
#[derive(Debug, Clone)]
pub struct Gradient {
    pub(crate) top_left: NodeColor,
    pub(crate) top_right: NodeColor,
    pub(crate) bottom_left: NodeColor,
    pub(crate) bottom_right: NodeColor,
    pub(crate) dirty: DirtyState,
}

impl Gradient {
    pub(crate) const TOP_LEFT_DIRTY: DirtyState = DirtyState::KIND_A;
    pub(crate) const TOP_RIGHT_DIRTY: DirtyState = DirtyState::KIND_B;
    pub(crate) const BOTTOM_LEFT_DIRTY: DirtyState = DirtyState::KIND_C;
    pub(crate) const BOTTOM_RIGHT_DIRTY: DirtyState = DirtyState::KIND_D;

    /// Left-to-right gradient.
    pub fn horizontal(left: NodeColor, right: NodeColor) -> Self {
        let mut gradient = Self::default();
        gradient.set_colors_h(left, right);
        gradient
    }

    /// Top-to-bottom gradient.
    pub fn vertical(top: NodeColor, bottom: NodeColor) -> Self {
        let mut gradient = Self::default();
        gradient.set_colors_v(top, bottom);
        gradient
    }

    pub fn set_colors_h(&mut self, left: NodeColor, right: NodeColor) {
        self.set_colors(left, right, left, right);
    }

    pub fn set_colors_v(&mut self, top: NodeColor, bottom: NodeColor) {
        self.set_colors(top, top, bottom, bottom);
    }

    pub fn set_colors(
        &mut self,
        top_left: NodeColor,
        top_right: NodeColor,
        bottom_left: NodeColor,
        bottom_right: NodeColor,
    ) {
        Self::set_corner(&mut self.dirty, Self::TOP_LEFT_DIRTY, &mut self.top_left, top_left);
        Self::set_corner(&mut self.dirty, Self::TOP_RIGHT_DIRTY, &mut self.top_right, top_right);
        Self::set_corner(&mut self.dirty, Self::BOTTOM_LEFT_DIRTY, &mut self.bottom_left, bottom_left);
        Self::set_corner(&mut self.dirty, Self::BOTTOM_RIGHT_DIRTY, &mut self.bottom_right, bottom_right);
    }

    fn set_corner(dirty: &mut DirtyState, group: DirtyState, dst: &mut NodeColor, src: NodeColor) {
        if *dst == src {
            return;
        }
        *dst = src;
        dirty.insert(group);
    }

    pub fn top_left(&self) -> NodeColor {
        self.top_left
    }

    pub fn top_right(&self) -> NodeColor {
        self.top_right
    }

    pub fn bottom_left(&self) -> NodeColor {
        self.bottom_left
    }

    pub fn bottom_right(&self) -> NodeColor {
        self.bottom_right
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            top_left: NodeColor::white(),
            top_right: NodeColor::white(),
            bottom_left: NodeColor::white(),
            bottom_right: NodeColor::white(),
            dirty: DirtyState::EMPTY,
        }
    }
}

impl PartialEq for Gradient {
    fn eq(&self, other: &Self) -> bool {
        self.top_left == other.top_left
            && self.top_right == other.top_right
            && self.bottom_left == other.bottom_left
            && self.bottom_right == other.bottom_right
    }
}

/// One painted segment in the canvas' local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub from: Point,
    pub to: Point,
}

/// Finger-painting surface.
///
/// On the authority, touches append segments to the stroke queue; the queue is
/// written once per flush and then emptied. On a replica, received segments
/// accumulate until the draw pass consumes them.
#[derive(Debug, Clone)]
pub struct DrawingCanvas {
    pub(crate) brush_color: NodeColor,
    pub(crate) brush_size: f64,
    pub(crate) brush_image: Option<String>,
    pub(crate) strokes: VecDeque<Stroke>,
    max_queued: usize,
    pub(crate) dirty: DirtyState,
}

impl DrawingCanvas {
    pub(crate) const STROKES_DIRTY: DirtyState = DirtyState::KIND_A;
    pub(crate) const BRUSH_IMAGE_DIRTY: DirtyState = DirtyState::KIND_B;
    pub(crate) const BRUSH_COLOR_DIRTY: DirtyState = DirtyState::KIND_C;
    pub(crate) const BRUSH_SIZE_DIRTY: DirtyState = DirtyState::KIND_D;

    pub fn new(brush_image: impl Into<String>) -> Self {
        let mut canvas = Self::default();
        canvas.set_brush_image(brush_image);
        canvas
    }

    /// Cap the stroke queue at `max_queued` segments.
    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued.max(1);
        self.trim();
        self
    }

    pub fn brush_color(&self) -> NodeColor {
        self.brush_color
    }

    pub fn set_brush_color(&mut self, color: NodeColor) {
        self.brush_color = color;
        self.dirty.insert(Self::BRUSH_COLOR_DIRTY);
    }

    pub fn set_brush_opacity(&mut self, opacity: f64) {
        self.brush_color.a = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.dirty.insert(Self::BRUSH_COLOR_DIRTY);
    }

    pub fn brush_size(&self) -> f64 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, size: f64) {
        self.brush_size = size;
        self.dirty.insert(Self::BRUSH_SIZE_DIRTY);
    }

    pub fn brush_image(&self) -> Option<&str> {
        self.brush_image.as_deref()
    }

    pub fn set_brush_image(&mut self, path: impl Into<String>) {
        let path = path.into();
        if path.is_empty() {
            log::warn!("No brush image path supplied to drawing canvas");
            return;
        }
        self.brush_image = Some(path);
        self.dirty.insert(Self::BRUSH_IMAGE_DIRTY);
    }

    /// Queue a painted segment, dropping the oldest ones past the cap.
    pub fn push_stroke(&mut self, from: Point, to: Point) {
        self.strokes.push_back(Stroke { from, to });
        self.trim();
        self.dirty.insert(Self::STROKES_DIRTY);
    }

    pub(crate) fn extend_strokes(&mut self, strokes: impl IntoIterator<Item = Stroke>) {
        self.strokes.extend(strokes);
        self.trim();
    }

    pub fn queued_strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter()
    }

    pub fn queued_len(&self) -> usize {
        self.strokes.len()
    }

    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    /// Remove and return every queued segment.
    pub fn take_strokes(&mut self) -> Vec<Stroke> {
        self.strokes.drain(..).collect()
    }

    fn trim(&mut self) {
        let excess = self.strokes.len().saturating_sub(self.max_queued);
        if excess > 0 {
            log::debug!("Drawing canvas dropping {} queued strokes", excess);
            self.strokes.drain(..excess);
        }
    }
}

impl Default for DrawingCanvas {
    fn default() -> Self {
        Self {
            brush_color: NodeColor::new(255, 77, 77, 179),
            brush_size: 24.0,
            brush_image: None,
            strokes: VecDeque::new(),
            max_queued: DEFAULT_MAX_QUEUED_STROKES,
            dirty: Self::BRUSH_SIZE_DIRTY | Self::BRUSH_COLOR_DIRTY,
        }
    }
}

impl PartialEq for DrawingCanvas {
    fn eq(&self, other: &Self) -> bool {
        self.brush_color == other.brush_color
            && self.brush_size == other.brush_size
            && self.brush_image == other.brush_image
    }
}

/// Surface showing a web page. Only the URL is replicated.
#[derive(Debug, Clone, Default)]
pub struct WebSurface {
    pub(crate) url: String,
    pub(crate) dirty: DirtyState,
}

impl WebSurface {
    pub(crate) const URL_DIRTY: DirtyState = DirtyState::KIND_A;

    pub fn new(url: impl Into<String>) -> Self {
        let mut surface = Self::default();
        surface.set_url(url);
        surface
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if url == self.url {
            return;
        }
        self.url = url;
        self.dirty.insert(Self::URL_DIRTY);
    }
}

impl PartialEq for WebSurface {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_skips_unchanged_corners() {
        let mut gradient = Gradient::default();
        gradient.set_colors_h(NodeColor::white(), NodeColor::black());

        let dirty = gradient.dirty;
        assert!(!dirty.has(Gradient::TOP_LEFT_DIRTY));
        assert!(dirty.has(Gradient::TOP_RIGHT_DIRTY));
        assert!(!dirty.has(Gradient::BOTTOM_LEFT_DIRTY));
        assert!(dirty.has(Gradient::BOTTOM_RIGHT_DIRTY));
    }

    #[test]
    fn test_canvas_queue_drops_oldest() {
        let mut canvas = DrawingCanvas::new("brush.png").with_max_queued(3);
        for i in 0..5 {
            let p = Point::new(i as f64, 0.0);
            canvas.push_stroke(p, p);
        }

        assert_eq!(canvas.queued_len(), 3);
        let first = canvas.queued_strokes().next().unwrap();
        assert_eq!(first.from, Point::new(2.0, 0.0));
    }

    #[test]
    fn test_canvas_rejects_empty_brush_path() {
        let mut canvas = DrawingCanvas::default();
        canvas.set_brush_image("");
        assert!(canvas.brush_image().is_none());
        assert!(!canvas.dirty.has(DrawingCanvas::BRUSH_IMAGE_DIRTY));
    }

    #[test]
    fn test_web_url_dirty_only_on_change() {
        let mut web = WebSurface::new("https://example.com");
        assert!(web.dirty.has(WebSurface::URL_DIRTY));

        web.dirty.clear();
        web.set_url("https://example.com");
        assert!(web.dirty.is_empty());
    }

    #[test]
    fn test_kind_id_construct_matches() {
        for kind in [KindId::Plain, KindId::Gradient, KindId::DrawingCanvas, KindId::WebSurface] {
            assert_eq!(kind.construct().id(), kind);
        }
    }
}
