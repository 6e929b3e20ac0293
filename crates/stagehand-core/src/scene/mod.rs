//! Scene graph: nodes, their hierarchy and the id directory.

mod dirty;
mod directory;
mod graph;
mod kind;
mod node;

pub use dirty::DirtyState;
pub use directory::SceneDirectory;
pub use graph::SceneGraph;
pub use kind::{DrawingCanvas, Gradient, KindId, NodeKind, Stroke, WebSurface, DEFAULT_MAX_QUEUED_STROKES};
pub use node::{Node, NodeSnapshot};

use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Process-unique node identifier.
///
/// Ids are handed out by the [`SceneDirectory`] and are never reused within a
/// process. The authority's ids travel on the wire unchanged, so a replica's
/// node carries the same id as its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel meaning "no node".
    pub const EMPTY: NodeId = NodeId(0);
    /// The root node every scene starts with.
    pub const ROOT: NodeId = NodeId(1);

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Structural misuse of the scene graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Node id {0} is already registered")]
    DuplicateId(NodeId),
    #[error("Node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("Cannot attach {child} under its own descendant {parent}")]
    Cycle { child: NodeId, parent: NodeId },
    #[error("The root node cannot be reparented or destroyed")]
    RootLocked,
}

/// RGBA8 color used for node and brush colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl NodeColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Same color with the alpha scaled by `opacity` (clamped to 0..=1).
    pub fn with_opacity(self, opacity: f64) -> Self {
        let alpha = (self.a as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a: alpha, ..self }
    }
}

impl Default for NodeColor {
    fn default() -> Self {
        Self::white()
    }
}

impl From<Color> for NodeColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<NodeColor> for Color {
    fn from(color: NodeColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}
