//! Replication channel: per-tick batches of dirty node records.
//!
//! The authority calls [`ReplicationChannel::flush`] once per logic tick. The
//! resulting buffer is handed to the transport as one immutable [`Bytes`]
//! value. A replica hands each received buffer to
//! [`ReplicationChannel::apply_batch`], which decodes the whole batch before
//! touching the scene so rendering never observes a half-applied batch.

use crate::codec::{
    decode_attribute, opcode, write_attributes, Attribute, BaseAttribute, BlobReader, BlobRegistry, BlobWriter,
    CodecError, Role, CONTROL_TAG, PROTOCOL_VERSION,
};
use crate::scene::{KindId, NodeId, NodeKind, SceneGraph, StructuralError, DEFAULT_MAX_QUEUED_STROKES};
use bytes::Bytes;
use thiserror::Error;

/// Fatal channel errors. Per-record problems are logged and skipped instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("Malformed batch framing: {0}")]
    Framing(#[from] CodecError),
    #[error("Record body of {len} bytes overruns the batch ({remaining} remaining)")]
    Overrun { len: usize, remaining: usize },
    #[error("Replication channel is closed")]
    Closed,
}

/// What a call to [`ReplicationChannel::apply_batch`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub frame: u64,
    /// Node records applied.
    pub applied: usize,
    /// Nodes constructed from a create record.
    pub created: usize,
    /// Records or directives that were dropped.
    pub skipped: usize,
    /// Subtrees destroyed.
    pub destroyed: usize,
}

enum Entry {
    Record {
        id: NodeId,
        kind: KindId,
        attributes: Vec<Attribute>,
    },
    Destroy(NodeId),
}

struct DecodedBatch {
    frame: u64,
    entries: Vec<Entry>,
    skipped: usize,
}

/// One end of the replication stream.
#[derive(Debug, Clone)]
pub struct ReplicationChannel {
    role: Role,
    /// Last frame written (authority).
    frame: u64,
    /// Last frame applied (replica).
    last_applied: Option<u64>,
    closed: bool,
    /// Destroy directives carried by the last flushed batch.
    in_flight: Vec<NodeId>,
    /// Stroke cap of canvases constructed from the wire.
    max_queued_strokes: usize,
}

impl ReplicationChannel {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            frame: 0,
            last_applied: None,
            closed: false,
            in_flight: Vec::new(),
            max_queued_strokes: DEFAULT_MAX_QUEUED_STROKES,
        }
    }

    /// Cap the stroke queue of drawing canvases this channel constructs.
    pub fn with_max_queued_strokes(mut self, max_queued: usize) -> Self {
        self.max_queued_strokes = max_queued;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Last frame number written or applied.
    pub fn frame(&self) -> u64 {
        match self.role {
            Role::Authority => self.frame,
            Role::Replica => self.last_applied.unwrap_or(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Hand the destroy directives of the last flush back to `graph` so the
    /// next flush carries them again. Call when that batch was not delivered.
    pub fn requeue_unsent(&mut self, graph: &mut SceneGraph) {
        if !self.in_flight.is_empty() {
            log::debug!("Requeueing {} destroy directives", self.in_flight.len());
            graph.requeue_removed(std::mem::take(&mut self.in_flight));
        }
    }

    /// Reopen the channel and forget frame history, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.last_applied = None;
        self.closed = false;
    }

    /// Serialize every dirty node and queued destroy directive, clearing the
    /// dirty state consumed. Returns `None` when there is nothing to send.
    pub fn flush(&mut self, graph: &mut SceneGraph, registry: &BlobRegistry) -> Option<Bytes> {
        if self.role != Role::Authority {
            log::warn!("Flush called on a replica channel");
            return None;
        }
        let order = graph.flush_order();
        let removed = graph.take_removed();
        self.in_flight.clear();
        if order.is_empty() && removed.is_empty() {
            return None;
        }

        self.frame += 1;
        let mut writer = BlobWriter::new(self.frame);
        let mut records = 0;
        for id in order {
            let index = sibling_index(graph, id);
            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            let Some(type_tag) = registry.tag_for(node.kind_id()) else {
                log::warn!("No type tag installed for {} node {}", node.kind_id().name(), id);
                node.clear_dirty();
                continue;
            };
            writer.begin_record(type_tag, id);
            write_attributes(&mut writer, node, index);
            writer.end_record();
            node.clear_dirty();
            records += 1;
        }
        for id in &removed {
            writer.write_control(opcode::DESTROY, *id);
        }
        self.in_flight = removed;

        log::debug!(
            "Flushed frame {}: {} records, {} destroyed, {} bytes",
            self.frame,
            records,
            self.in_flight.len(),
            writer.len()
        );
        Some(writer.finish())
    }

    /// Decode `data` and apply it to `graph` as one unit.
    ///
    /// Bad records are logged and skipped. Framing that makes record
    /// boundaries unrecoverable closes the channel.
    pub fn apply_batch(
        &mut self,
        graph: &mut SceneGraph,
        registry: &BlobRegistry,
        data: &[u8],
    ) -> Result<BatchSummary, ReplicationError> {
        if self.closed {
            return Err(ReplicationError::Closed);
        }
        let batch = match decode_batch(registry, data) {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("Closing replication channel: {}", e);
                self.closed = true;
                return Err(e);
            }
        };

        let mut summary = BatchSummary {
            frame: batch.frame,
            skipped: batch.skipped,
            ..Default::default()
        };
        if self.last_applied.is_some_and(|last| batch.frame <= last) {
            log::warn!("Dropping stale frame {} (last applied {:?})", batch.frame, self.last_applied);
            summary.skipped += batch.entries.len();
            return Ok(summary);
        }

        for entry in batch.entries {
            match entry {
                Entry::Destroy(id) => match graph.remove_remote(id) {
                    Ok(()) => summary.destroyed += 1,
                    // Already gone with an ancestor, or never sent.
                    Err(StructuralError::UnknownNode(_)) => {}
                    Err(e) => {
                        log::warn!("Ignoring destroy directive: {}", e);
                        summary.skipped += 1;
                    }
                },
                Entry::Record { id, kind, attributes } => {
                    if apply_record(graph, id, kind, &attributes, self.max_queued_strokes, &mut summary) {
                        summary.applied += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
            }
        }

        self.last_applied = Some(batch.frame);
        log::debug!("Applied frame {}: {:?}", batch.frame, summary);
        Ok(summary)
    }
}

fn sibling_index(graph: &SceneGraph, id: NodeId) -> u32 {
    graph
        .node(id)
        .and_then(|node| node.parent())
        .and_then(|parent| graph.node(parent))
        .and_then(|parent| parent.children().iter().position(|&c| c == id))
        .unwrap_or(0) as u32
}

fn decode_batch(registry: &BlobRegistry, data: &[u8]) -> Result<DecodedBatch, ReplicationError> {
    let mut reader = BlobReader::new(data);
    let version = reader.read_u8()?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version).into());
    }
    let frame = reader.read_u64()?;

    let mut entries = Vec::new();
    let mut skipped = 0;
    while !reader.is_empty() {
        let type_tag = reader.read_u8()?;
        if type_tag == CONTROL_TAG {
            let op = reader.read_u8()?;
            let id = reader.read_id()?;
            match op {
                opcode::DESTROY => entries.push(Entry::Destroy(id)),
                other => {
                    log::warn!("Unknown control opcode {} for node {}", other, id);
                    skipped += 1;
                }
            }
            continue;
        }

        let id = reader.read_id()?;
        let len = reader.read_u32()? as usize;
        if len > reader.remaining() {
            return Err(ReplicationError::Overrun {
                len,
                remaining: reader.remaining(),
            });
        }
        let body = reader.take(len)?;

        let Some(handler) = registry.handler(type_tag) else {
            log::warn!("Unknown type tag {} for node {}, record dropped", type_tag, id);
            skipped += 1;
            continue;
        };
        match decode_body(body, handler.decode) {
            Ok(attributes) => entries.push(Entry::Record {
                id,
                kind: handler.kind,
                attributes,
            }),
            Err(reason) => {
                log::warn!("Dropping record for {} node {}: {}", handler.kind.name(), id, reason);
                skipped += 1;
            }
        }
    }

    Ok(DecodedBatch {
        frame,
        entries,
        skipped,
    })
}

fn decode_body(
    mut body: BlobReader<'_>,
    decoder: Option<crate::codec::KindDecoder>,
) -> Result<Vec<Attribute>, String> {
    let mut attributes = Vec::new();
    while !body.is_empty() {
        let attribute_tag = body.read_u8().map_err(|e| e.to_string())?;
        match decode_attribute(attribute_tag, &mut body, decoder) {
            Ok(Some(attribute)) => attributes.push(attribute),
            Ok(None) => return Err(format!("unknown attribute tag {}", attribute_tag)),
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(attributes)
}

/// Returns `false` when the record was dropped.
fn apply_record(
    graph: &mut SceneGraph,
    id: NodeId,
    kind: KindId,
    attributes: &[Attribute],
    max_queued_strokes: usize,
    summary: &mut BatchSummary,
) -> bool {
    match graph.node(id).map(|node| node.kind_id()) {
        Some(existing) if existing != kind => {
            log::warn!("Record for node {} has kind {:?}, node is {:?}", id, kind, existing);
            return false;
        }
        Some(_) => {}
        None => {
            let creates = attributes
                .iter()
                .any(|a| matches!(a, Attribute::Base(BaseAttribute::Create)));
            if !creates {
                log::warn!("Attribute record for unknown node {}, record dropped", id);
                return false;
            }
            let constructed = match kind.construct() {
                NodeKind::DrawingCanvas(canvas) => NodeKind::DrawingCanvas(canvas.with_max_queued(max_queued_strokes)),
                other => other,
            };
            if let Err(e) = graph.insert_remote(id, constructed) {
                log::warn!("Cannot construct node {}: {}", id, e);
                return false;
            }
            summary.created += 1;
        }
    }

    for attribute in attributes {
        match attribute {
            Attribute::Base(BaseAttribute::Parent { parent, index }) => {
                if let Err(e) = graph.attach_remote(id, Some(*parent), *index as usize) {
                    log::warn!("Cannot attach node {} under {}: {}", id, parent, e);
                }
            }
            other => {
                if let Some(node) = graph.node_mut(id) {
                    other.apply(node);
                }
            }
        }
    }
    true
}
