//! Attribute records: writing a node's dirty groups and decoding them back.

use super::{tag, BlobReader, BlobWriter, CodecError, KindDecoder};
use crate::scene::{DirtyState, DrawingCanvas, Gradient, Node, NodeColor, NodeId, NodeKind, Stroke, WebSurface};
use kurbo::{Point, Size, Vec2};

const FLAG_VISIBLE: u8 = 1 << 0;
const FLAG_ENABLED: u8 = 1 << 1;
const FLAG_TRANSPARENT: u8 = 1 << 2;
const FLAG_DRAW_SORTED: u8 = 1 << 3;

/// Bytes per encoded stroke segment (two points).
const STROKE_BYTES: usize = 32;

/// Decoded base (geometry and visibility) attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseAttribute {
    Create,
    Parent { parent: NodeId, index: u32 },
    Size(Size),
    Position(Point),
    Scale(Vec2),
    Rotation(f64),
    Center(Point),
    Color(NodeColor),
    Opacity(f64),
    Flags {
        visible: bool,
        enabled: bool,
        transparent: bool,
        draw_sorted: bool,
    },
    ZLevel(f64),
}

/// Decoded kind-specific attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum KindAttribute {
    TopLeft(NodeColor),
    TopRight(NodeColor),
    BottomLeft(NodeColor),
    BottomRight(NodeColor),
    Strokes(Vec<Stroke>),
    BrushImage(String),
    BrushColor(NodeColor),
    BrushSize(f64),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Base(BaseAttribute),
    Kind(KindAttribute),
}

/// Write one (tag, payload) pair per dirty group of `node`, base groups first.
///
/// `sibling_index` is the node's position in its parent's child list, written
/// with the parent group. Queued canvas strokes are drained once written.
pub fn write_attributes(writer: &mut BlobWriter, node: &mut Node, sibling_index: u32) {
    let dirty = node.dirty();

    if dirty.has(DirtyState::CREATE) {
        writer.write_u8(tag::CREATE);
    }
    if dirty.has(DirtyState::PARENT) {
        writer.write_u8(tag::PARENT);
        writer.write_u32(node.parent.unwrap_or(NodeId::EMPTY).0);
        writer.write_u32(sibling_index);
    }
    if dirty.has(DirtyState::SIZE) {
        writer.write_u8(tag::SIZE);
        writer.write_size(node.size);
    }
    if dirty.has(DirtyState::POSITION) {
        writer.write_u8(tag::POSITION);
        writer.write_point(node.position);
    }
    if dirty.has(DirtyState::SCALE) {
        writer.write_u8(tag::SCALE);
        writer.write_vec2(node.scale);
    }
    if dirty.has(DirtyState::ROTATION) {
        writer.write_u8(tag::ROTATION);
        writer.write_f64(node.rotation);
    }
    if dirty.has(DirtyState::CENTER) {
        writer.write_u8(tag::CENTER);
        writer.write_point(node.center);
    }
    if dirty.has(DirtyState::COLOR) {
        writer.write_u8(tag::COLOR);
        writer.write_color(node.color);
    }
    if dirty.has(DirtyState::OPACITY) {
        writer.write_u8(tag::OPACITY);
        writer.write_f64(node.opacity);
    }
    if dirty.has(DirtyState::FLAGS) {
        let mut flags = 0;
        for (set, bit) in [
            (node.visible, FLAG_VISIBLE),
            (node.enabled, FLAG_ENABLED),
            (node.transparent, FLAG_TRANSPARENT),
            (node.draw_sorted, FLAG_DRAW_SORTED),
        ] {
            if set {
                flags |= bit;
            }
        }
        writer.write_u8(tag::FLAGS);
        writer.write_u8(flags);
    }
    if dirty.has(DirtyState::Z_LEVEL) {
        writer.write_u8(tag::Z_LEVEL);
        writer.write_f64(node.z_level);
    }

    match &mut node.kind {
        NodeKind::Plain => {}
        NodeKind::Gradient(gradient) => write_gradient(writer, gradient),
        NodeKind::DrawingCanvas(canvas) => write_canvas(writer, canvas),
        NodeKind::WebSurface(web) => write_web(writer, web),
    }
}

fn write_gradient(writer: &mut BlobWriter, gradient: &Gradient) {
    for (group, attribute_tag, color) in [
        (Gradient::TOP_LEFT_DIRTY, tag::GRADIENT_TOP_LEFT, gradient.top_left),
        (Gradient::TOP_RIGHT_DIRTY, tag::GRADIENT_TOP_RIGHT, gradient.top_right),
        (Gradient::BOTTOM_LEFT_DIRTY, tag::GRADIENT_BOTTOM_LEFT, gradient.bottom_left),
        (Gradient::BOTTOM_RIGHT_DIRTY, tag::GRADIENT_BOTTOM_RIGHT, gradient.bottom_right),
    ] {
        if gradient.dirty.has(group) {
            writer.write_u8(attribute_tag);
            writer.write_color(color);
        }
    }
}

fn write_canvas(writer: &mut BlobWriter, canvas: &mut DrawingCanvas) {
    let dirty = canvas.dirty;
    if dirty.has(DrawingCanvas::STROKES_DIRTY) {
        let strokes = canvas.take_strokes();
        writer.write_u8(tag::CANVAS_STROKES);
        writer.write_u32(strokes.len() as u32);
        for stroke in strokes {
            writer.write_point(stroke.from);
            writer.write_point(stroke.to);
        }
    }
    if dirty.has(DrawingCanvas::BRUSH_IMAGE_DIRTY) {
        writer.write_u8(tag::CANVAS_BRUSH_IMAGE);
        writer.write_str(canvas.brush_image.as_deref().unwrap_or_default());
    }
    if dirty.has(DrawingCanvas::BRUSH_COLOR_DIRTY) {
        writer.write_u8(tag::CANVAS_BRUSH_COLOR);
        writer.write_color(canvas.brush_color);
    }
    if dirty.has(DrawingCanvas::BRUSH_SIZE_DIRTY) {
        writer.write_u8(tag::CANVAS_BRUSH_SIZE);
        writer.write_f64(canvas.brush_size);
    }
}

fn write_web(writer: &mut BlobWriter, web: &WebSurface) {
    if web.dirty.has(WebSurface::URL_DIRTY) {
        writer.write_u8(tag::WEB_URL);
        writer.write_str(&web.url);
    }
}

/// Decode the payload for `attribute_tag`.
///
/// The kind decoder gets the first look; tags it does not claim fall through
/// to the base decoder. `Ok(None)` means nobody claimed the tag.
pub fn decode_attribute(
    attribute_tag: u8,
    reader: &mut BlobReader<'_>,
    kind_decoder: Option<KindDecoder>,
) -> Result<Option<Attribute>, CodecError> {
    if let Some(decode) = kind_decoder {
        if let Some(attribute) = decode(attribute_tag, reader)? {
            return Ok(Some(Attribute::Kind(attribute)));
        }
    }
    Ok(decode_base(attribute_tag, reader)?.map(Attribute::Base))
}

fn decode_base(attribute_tag: u8, reader: &mut BlobReader<'_>) -> Result<Option<BaseAttribute>, CodecError> {
    let attribute = match attribute_tag {
        tag::CREATE => BaseAttribute::Create,
        tag::PARENT => BaseAttribute::Parent {
            parent: reader.read_id()?,
            index: reader.read_u32()?,
        },
        tag::SIZE => BaseAttribute::Size(reader.read_size()?),
        tag::POSITION => BaseAttribute::Position(reader.read_point()?),
        tag::SCALE => BaseAttribute::Scale(reader.read_vec2()?),
        tag::ROTATION => BaseAttribute::Rotation(reader.read_f64()?),
        tag::CENTER => BaseAttribute::Center(reader.read_point()?),
        tag::COLOR => BaseAttribute::Color(reader.read_color()?),
        tag::OPACITY => BaseAttribute::Opacity(reader.read_f64()?),
        tag::FLAGS => {
            let flags = reader.read_u8()?;
            BaseAttribute::Flags {
                visible: flags & FLAG_VISIBLE != 0,
                enabled: flags & FLAG_ENABLED != 0,
                transparent: flags & FLAG_TRANSPARENT != 0,
                draw_sorted: flags & FLAG_DRAW_SORTED != 0,
            }
        }
        tag::Z_LEVEL => BaseAttribute::ZLevel(reader.read_f64()?),
        _ => return Ok(None),
    };
    Ok(Some(attribute))
}

pub(crate) fn decode_gradient(
    attribute_tag: u8,
    reader: &mut BlobReader<'_>,
) -> Result<Option<KindAttribute>, CodecError> {
    let attribute = match attribute_tag {
        tag::GRADIENT_TOP_LEFT => KindAttribute::TopLeft(reader.read_color()?),
        tag::GRADIENT_TOP_RIGHT => KindAttribute::TopRight(reader.read_color()?),
        tag::GRADIENT_BOTTOM_LEFT => KindAttribute::BottomLeft(reader.read_color()?),
        tag::GRADIENT_BOTTOM_RIGHT => KindAttribute::BottomRight(reader.read_color()?),
        _ => return Ok(None),
    };
    Ok(Some(attribute))
}

pub(crate) fn decode_canvas(
    attribute_tag: u8,
    reader: &mut BlobReader<'_>,
) -> Result<Option<KindAttribute>, CodecError> {
    let attribute = match attribute_tag {
        tag::CANVAS_STROKES => {
            let count = reader.read_u32()? as usize;
            let needed = count.saturating_mul(STROKE_BYTES);
            if needed > reader.remaining() {
                return Err(CodecError::Truncated {
                    needed,
                    remaining: reader.remaining(),
                });
            }
            let mut strokes = Vec::with_capacity(count);
            for _ in 0..count {
                strokes.push(Stroke {
                    from: reader.read_point()?,
                    to: reader.read_point()?,
                });
            }
            KindAttribute::Strokes(strokes)
        }
        tag::CANVAS_BRUSH_IMAGE => KindAttribute::BrushImage(reader.read_str()?),
        tag::CANVAS_BRUSH_COLOR => KindAttribute::BrushColor(reader.read_color()?),
        tag::CANVAS_BRUSH_SIZE => KindAttribute::BrushSize(reader.read_f64()?),
        _ => return Ok(None),
    };
    Ok(Some(attribute))
}

pub(crate) fn decode_web(attribute_tag: u8, reader: &mut BlobReader<'_>) -> Result<Option<KindAttribute>, CodecError> {
    match attribute_tag {
        tag::WEB_URL => Ok(Some(KindAttribute::Url(reader.read_str()?))),
        _ => Ok(None),
    }
}

impl Attribute {
    /// Write the decoded value into `node` without marking it dirty.
    ///
    /// Construction and parenting need the scene graph and are applied by the
    /// replication channel; here they are no-ops.
    pub fn apply(&self, node: &mut Node) {
        match self {
            Attribute::Base(base) => base.apply(node),
            Attribute::Kind(kind) => kind.apply(node),
        }
    }
}

impl BaseAttribute {
    fn apply(&self, node: &mut Node) {
        match *self {
            BaseAttribute::Create | BaseAttribute::Parent { .. } => return,
            BaseAttribute::Size(size) => node.size = size,
            BaseAttribute::Position(position) => node.position = position,
            BaseAttribute::Scale(scale) => node.scale = scale,
            BaseAttribute::Rotation(rotation) => node.rotation = rotation,
            BaseAttribute::Center(center) => node.center = center,
            BaseAttribute::Color(color) => node.color = color,
            BaseAttribute::Opacity(opacity) => node.opacity = opacity,
            BaseAttribute::Flags {
                visible,
                enabled,
                transparent,
                draw_sorted,
            } => {
                node.visible = visible;
                node.enabled = enabled;
                node.transparent = transparent;
                node.draw_sorted = draw_sorted;
            }
            BaseAttribute::ZLevel(z_level) => node.z_level = z_level,
        }
        node.invalidate();
    }
}

impl KindAttribute {
    fn apply(&self, node: &mut Node) {
        let id = node.id;
        let applied = match (&mut node.kind, self) {
            (NodeKind::Gradient(g), KindAttribute::TopLeft(c)) => {
                g.top_left = *c;
                true
            }
            (NodeKind::Gradient(g), KindAttribute::TopRight(c)) => {
                g.top_right = *c;
                true
            }
            (NodeKind::Gradient(g), KindAttribute::BottomLeft(c)) => {
                g.bottom_left = *c;
                true
            }
            (NodeKind::Gradient(g), KindAttribute::BottomRight(c)) => {
                g.bottom_right = *c;
                true
            }
            (NodeKind::DrawingCanvas(canvas), KindAttribute::Strokes(strokes)) => {
                canvas.extend_strokes(strokes.iter().copied());
                true
            }
            (NodeKind::DrawingCanvas(canvas), KindAttribute::BrushImage(path)) => {
                canvas.brush_image = (!path.is_empty()).then(|| path.clone());
                true
            }
            (NodeKind::DrawingCanvas(canvas), KindAttribute::BrushColor(color)) => {
                canvas.brush_color = *color;
                true
            }
            (NodeKind::DrawingCanvas(canvas), KindAttribute::BrushSize(size)) => {
                canvas.brush_size = *size;
                true
            }
            (NodeKind::WebSurface(web), KindAttribute::Url(url)) => {
                web.url = url.clone();
                true
            }
            _ => false,
        };
        if !applied {
            log::warn!("Attribute {:?} does not apply to {:?} node {}", self, node.kind.id(), id);
        }
    }
}
