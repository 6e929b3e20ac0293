//! Per-tick drivers for both ends of the replication channel.
//!
//! The [`AuthorityEngine`] owns logic and touch: each tick it reacts to relay
//! events, drains raw touch samples, advances gestures and sends one batch.
//! The [`ReplicaEngine`] applies received batches and draws.

use crate::codec::{BlobRegistry, Role};
use crate::feed::{self, FeedConsumer, FeedProducer};
use crate::render::{self, RenderBackend};
use crate::replication::{BatchSummary, ReplicationChannel};
use crate::scene::{DrawingCanvas, NodeId, NodeKind, SceneGraph, StructuralError};
use crate::settings::EngineSettings;
use crate::sync::{BatchTransport, ClientMessage, SyncError, SyncEvent};
use crate::touch::{GestureEvent, TouchEngine, TouchSample};

/// Raw touch samples buffered between ticks before the oldest are dropped.
pub const TOUCH_FEED_CAPACITY: usize = 1024;

/// Logic side: owns the authoritative scene.
pub struct AuthorityEngine<T: BatchTransport> {
    settings: EngineSettings,
    graph: SceneGraph,
    registry: BlobRegistry,
    channel: ReplicationChannel,
    touch: TouchEngine,
    samples: FeedConsumer<TouchSample>,
    transport: T,
}

impl<T: BatchTransport> AuthorityEngine<T> {
    /// Create the engine and the producer end of its touch feed.
    pub fn new(settings: EngineSettings, transport: T) -> (Self, FeedProducer<TouchSample>) {
        let (producer, samples) = feed::bounded(TOUCH_FEED_CAPACITY);
        let engine = Self {
            graph: SceneGraph::new(settings.world_size),
            registry: BlobRegistry::with_builtin_kinds(Role::Authority),
            channel: ReplicationChannel::new(Role::Authority),
            touch: TouchEngine::new(settings.touch.clone()),
            samples,
            transport,
            settings,
        };
        (engine, producer)
    }

    /// Join the configured room as its authority.
    pub fn join(&mut self) -> Result<(), SyncError> {
        log::info!("Joining room {} as authority", self.settings.room);
        self.transport.send_message(&ClientMessage::Join {
            room: self.settings.room.clone(),
            role: Role::Authority,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn registry_mut(&mut self) -> &mut BlobRegistry {
        &mut self.registry
    }

    pub fn touch(&self) -> &TouchEngine {
        &self.touch
    }

    pub fn frame(&self) -> u64 {
        self.channel.frame()
    }

    /// A drawing canvas whose stroke queue is capped by `max_serialized_points`.
    pub fn canvas_kind(&self, brush_image: impl Into<String>) -> NodeKind {
        NodeKind::DrawingCanvas(
            DrawingCanvas::new(brush_image).with_max_queued(self.settings.max_serialized_points),
        )
    }

    /// Destroy a subtree and drop any gesture state tracking it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), StructuralError> {
        let subtree = self.graph.preorder(id);
        self.graph.remove(id)?;
        for node in subtree {
            self.touch.forget_node(node);
        }
        Ok(())
    }

    /// Advance one tick at time `now` (seconds) and return the gestures it
    /// produced.
    ///
    /// A failed send re-marks the whole scene and requeues the batch's destroy
    /// directives, so the next successful flush carries full state.
    pub fn tick(&mut self, now: f64) -> Result<Vec<GestureEvent>, SyncError> {
        for event in self.transport.poll_events() {
            match event {
                SyncEvent::PeerJoined { peer_id, role: Role::Replica } => {
                    log::info!("Replica {} joined, scheduling full resync", peer_id);
                    self.graph.mark_all_dirty();
                }
                SyncEvent::PeerJoined { peer_id, role: Role::Authority } => {
                    log::warn!("Second authority {} joined the room", peer_id);
                }
                SyncEvent::JoinedRoom { room, peer_count } => {
                    log::info!("Joined room {} ({} peers)", room, peer_count);
                }
                SyncEvent::PeerLeft { peer_id } => log::info!("Peer {} left", peer_id),
                SyncEvent::BatchReceived(batch) => {
                    log::warn!("Authority ignoring inbound batch of {} bytes", batch.len());
                }
                SyncEvent::Error { message } => log::error!("Transport error: {}", message),
                SyncEvent::Connected => log::info!("Connected to relay"),
                SyncEvent::Disconnected => log::warn!("Disconnected from relay"),
            }
        }

        let samples = self.samples.drain();
        self.touch.handle_samples(&mut self.graph, samples);
        self.touch.update(&mut self.graph, now);

        if let Some(batch) = self.channel.flush(&mut self.graph, &self.registry) {
            if let Err(e) = self.transport.send_batch(batch) {
                log::error!("Failed to send frame {}: {}", self.channel.frame(), e);
                self.channel.requeue_unsent(&mut self.graph);
                self.graph.mark_all_dirty();
                return Err(e);
            }
        }
        Ok(self.touch.poll_events())
    }
}

/// Render side: mirrors the authority's scene.
pub struct ReplicaEngine<T: BatchTransport> {
    settings: EngineSettings,
    graph: SceneGraph,
    registry: BlobRegistry,
    channel: ReplicationChannel,
    transport: T,
}

impl<T: BatchTransport> ReplicaEngine<T> {
    pub fn new(settings: EngineSettings, transport: T) -> Self {
        Self {
            graph: SceneGraph::new(settings.world_size),
            registry: BlobRegistry::with_builtin_kinds(Role::Replica),
            channel: ReplicationChannel::new(Role::Replica)
                .with_max_queued_strokes(settings.max_serialized_points),
            transport,
            settings,
        }
    }

    /// Join the configured room as a replica. The authority answers with a
    /// full-state batch.
    pub fn join(&mut self) -> Result<(), SyncError> {
        log::info!("Joining room {} as replica", self.settings.room);
        self.transport.send_message(&ClientMessage::Join {
            room: self.settings.room.clone(),
            role: Role::Replica,
        })
    }

    /// Throw the mirrored scene away and ask for it again. The way back from a
    /// closed channel.
    pub fn resync(&mut self) -> Result<(), SyncError> {
        self.graph = SceneGraph::new(self.settings.world_size);
        self.channel.reset();
        self.join()
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn registry_mut(&mut self) -> &mut BlobRegistry {
        &mut self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Apply every batch received since the last tick.
    pub fn tick(&mut self) -> Vec<BatchSummary> {
        let mut summaries = Vec::new();
        for event in self.transport.poll_events() {
            match event {
                SyncEvent::JoinedRoom { room, peer_count } => {
                    log::info!("Joined room {} ({} peers)", room, peer_count);
                    self.channel.reset();
                }
                SyncEvent::BatchReceived(batch) => {
                    match self.channel.apply_batch(&mut self.graph, &self.registry, &batch) {
                        Ok(summary) => summaries.push(summary),
                        Err(e) => log::error!("Dropping batch: {}", e),
                    }
                }
                SyncEvent::PeerJoined { peer_id, role } => {
                    log::debug!("Peer {} joined as {:?}", peer_id, role);
                }
                SyncEvent::PeerLeft { peer_id } => log::info!("Peer {} left", peer_id),
                SyncEvent::Error { message } => log::error!("Transport error: {}", message),
                SyncEvent::Connected => log::info!("Connected to relay"),
                SyncEvent::Disconnected => log::warn!("Disconnected from relay"),
            }
        }
        summaries
    }

    pub fn draw(&mut self, backend: &mut impl RenderBackend) {
        render::draw(&mut self.graph, backend);
    }
}
