//! Type-tag registry for node kinds.

use super::attribute::{decode_canvas, decode_gradient, decode_web};
use super::{tag, BlobReader, CodecError, KindAttribute};
use crate::scene::KindId;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Decoder for the private attribute range of one node kind.
pub type KindDecoder = fn(u8, &mut BlobReader<'_>) -> Result<Option<KindAttribute>, CodecError>;

/// Which end of the replication channel this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owns logic and touch, produces batches.
    Authority,
    /// Render-only, applies batches.
    Replica,
}

/// Everything the codec needs to know about one node kind.
#[derive(Debug, Clone)]
pub struct BlobHandler {
    pub kind: KindId,
    /// Private attribute tags, `None` for kinds with base attributes only.
    pub attributes: Option<RangeInclusive<u8>>,
    /// Decoder for the private range. Only consulted on a replica.
    pub decode: Option<KindDecoder>,
}

impl BlobHandler {
    /// Handlers for every built-in kind, in installation order.
    pub fn builtin() -> [BlobHandler; 4] {
        [
            BlobHandler {
                kind: KindId::Plain,
                attributes: None,
                decode: None,
            },
            BlobHandler {
                kind: KindId::Gradient,
                attributes: Some(tag::GRADIENT_TOP_LEFT..=tag::GRADIENT_BOTTOM_RIGHT),
                decode: Some(decode_gradient),
            },
            BlobHandler {
                kind: KindId::DrawingCanvas,
                attributes: Some(tag::CANVAS_STROKES..=tag::CANVAS_BRUSH_SIZE),
                decode: Some(decode_canvas),
            },
            BlobHandler {
                kind: KindId::WebSurface,
                attributes: Some(tag::WEB_URL..=tag::WEB_URL),
                decode: Some(decode_web),
            },
        ]
    }
}

/// Per-process table mapping type tags to node kinds.
///
/// Tags are assigned sequentially from 1 in installation order; 0 is reserved
/// for control records. Both peers install the same kinds in the same order,
/// so a replica resolves the authority's tags to the right decoder.
#[derive(Debug, Clone)]
pub struct BlobRegistry {
    role: Role,
    handlers: Vec<BlobHandler>,
}

impl BlobRegistry {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            handlers: Vec::new(),
        }
    }

    /// Registry with every built-in kind installed.
    pub fn with_builtin_kinds(role: Role) -> Self {
        let mut registry = Self::new(role);
        for handler in BlobHandler::builtin() {
            // Built-in ranges are disjoint and above the base range.
            let _ = registry.install(handler);
        }
        registry
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Install `handler` and return its type tag.
    ///
    /// Fails when the handler's attribute range dips into the base range or
    /// overlaps a kind that is already installed.
    pub fn install(&mut self, mut handler: BlobHandler) -> Result<u8, CodecError> {
        if let Some(range) = &handler.attributes {
            if *range.start() <= tag::BASE_LAST {
                return Err(CodecError::ReservedRange(handler.kind));
            }
            for other in &self.handlers {
                let Some(other_range) = &other.attributes else {
                    continue;
                };
                if range.start() <= other_range.end() && other_range.start() <= range.end() {
                    return Err(CodecError::RangeCollision {
                        kind: handler.kind,
                        other: other.kind,
                    });
                }
            }
        }
        let type_tag = u8::try_from(self.handlers.len() + 1).map_err(|_| CodecError::TagsExhausted)?;
        if self.role == Role::Authority {
            handler.decode = None;
        }
        log::debug!("Installed {} as type tag {}", handler.kind.name(), type_tag);
        self.handlers.push(handler);
        Ok(type_tag)
    }

    /// Type tag to write for nodes of `kind`.
    pub fn tag_for(&self, kind: KindId) -> Option<u8> {
        self.handlers
            .iter()
            .position(|h| h.kind == kind)
            .and_then(|index| u8::try_from(index + 1).ok())
    }

    /// Handler bound to a received type tag.
    pub fn handler(&self, type_tag: u8) -> Option<&BlobHandler> {
        let index = usize::from(type_tag).checked_sub(1)?;
        self.handlers.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_sequential() {
        let registry = BlobRegistry::with_builtin_kinds(Role::Replica);
        assert_eq!(registry.tag_for(KindId::Plain), Some(1));
        assert_eq!(registry.tag_for(KindId::WebSurface), Some(4));
        assert_eq!(registry.handler(3).map(|h| h.kind), Some(KindId::DrawingCanvas));
        assert!(registry.handler(0).is_none());
        assert!(registry.handler(5).is_none());
    }

    #[test]
    fn test_range_collision_rejected() {
        let mut registry = BlobRegistry::with_builtin_kinds(Role::Replica);
        let clash = BlobHandler {
            kind: KindId::WebSurface,
            attributes: Some(83..=84),
            decode: None,
        };
        assert_eq!(
            registry.install(clash),
            Err(CodecError::RangeCollision {
                kind: KindId::WebSurface,
                other: KindId::Gradient,
            })
        );
    }

    #[test]
    fn test_reserved_range_rejected() {
        let mut registry = BlobRegistry::new(Role::Authority);
        let handler = BlobHandler {
            kind: KindId::Gradient,
            attributes: Some(70..=90),
            decode: None,
        };
        assert_eq!(registry.install(handler), Err(CodecError::ReservedRange(KindId::Gradient)));
    }

    #[test]
    fn test_authority_keeps_no_decoders() {
        let registry = BlobRegistry::with_builtin_kinds(Role::Authority);
        assert!(registry.handler(2).unwrap().decode.is_none());

        let registry = BlobRegistry::with_builtin_kinds(Role::Replica);
        assert!(registry.handler(2).unwrap().decode.is_some());
    }
}
