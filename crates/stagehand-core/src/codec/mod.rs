//! Binary attribute codec.
//!
//! A batch is a header followed by records:
//!
//! ```text
//! batch   := version:u8 frame:u64 record*
//! record  := type_tag:u8 node_id:u32 body_len:u32 body
//! body    := (attribute_tag:u8 payload)*
//! control := 0:u8 opcode:u8 node_id:u32
//! ```
//!
//! All integers and floats are little endian. Attribute tags `0..=79` are the
//! base geometry and visibility groups; node kinds claim private ranges above.

mod attribute;
mod reader;
mod registry;
mod writer;

pub use attribute::{decode_attribute, write_attributes, Attribute, BaseAttribute, KindAttribute};
pub use reader::BlobReader;
pub use registry::{BlobHandler, BlobRegistry, KindDecoder, Role};
pub use writer::BlobWriter;

use crate::scene::KindId;
use thiserror::Error;

/// Wire protocol version written in every batch header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Type tag introducing a control record instead of a node record.
pub const CONTROL_TAG: u8 = 0;

/// Control opcodes.
pub mod opcode {
    /// Destroy a node and its whole subtree.
    pub const DESTROY: u8 = 1;
}

/// Attribute tags.
pub mod tag {
    pub const CREATE: u8 = 1;
    pub const PARENT: u8 = 2;
    pub const SIZE: u8 = 3;
    pub const POSITION: u8 = 4;
    pub const SCALE: u8 = 5;
    pub const ROTATION: u8 = 6;
    pub const CENTER: u8 = 7;
    pub const COLOR: u8 = 8;
    pub const OPACITY: u8 = 9;
    pub const FLAGS: u8 = 10;
    pub const Z_LEVEL: u8 = 11;

    /// Last tag of the reserved base range.
    pub const BASE_LAST: u8 = 79;

    pub const GRADIENT_TOP_LEFT: u8 = 80;
    pub const GRADIENT_TOP_RIGHT: u8 = 81;
    pub const GRADIENT_BOTTOM_LEFT: u8 = 82;
    pub const GRADIENT_BOTTOM_RIGHT: u8 = 83;

    pub const CANVAS_STROKES: u8 = 84;
    pub const CANVAS_BRUSH_IMAGE: u8 = 85;
    pub const CANVAS_BRUSH_COLOR: u8 = 86;
    pub const CANVAS_BRUSH_SIZE: u8 = 87;

    pub const WEB_URL: u8 = 88;
}

/// Codec error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8,
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("Attribute range of {kind:?} collides with {other:?}")]
    RangeCollision { kind: KindId, other: KindId },
    #[error("Attribute range of {0:?} overlaps the reserved base range")]
    ReservedRange(KindId),
    #[error("No more type tags available")]
    TagsExhausted,
}
