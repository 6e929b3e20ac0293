//! Stagehand Core Library
//!
//! Scene graph, binary replication protocol and multi-touch gesture engine for
//! touch-driven displays whose logic and rendering run in separate processes.

pub mod codec;
pub mod engine;
pub mod feed;
pub mod render;
pub mod replication;
pub mod scene;
pub mod settings;
pub mod sync;
pub mod touch;

pub use codec::{BlobRegistry, CodecError, Role};
pub use engine::{AuthorityEngine, ReplicaEngine, TOUCH_FEED_CAPACITY};
pub use feed::{bounded, FeedConsumer, FeedProducer};
pub use render::RenderBackend;
pub use replication::{BatchSummary, ReplicationChannel, ReplicationError};
pub use scene::{
    DirtyState, DrawingCanvas, Gradient, Node, NodeColor, NodeId, NodeKind, SceneDirectory, SceneGraph, StructuralError,
    WebSurface,
};
pub use settings::{EngineSettings, SettingsError, TouchSettings};
pub use sync::{BatchTransport, ClientMessage, ConnectionState, MemoryTransport, ServerMessage, SyncError, SyncEvent};
pub use touch::{
    GestureEvent, GestureKind, MultiTouchConstraints, TouchCapabilities, TouchEngine, TouchInfo, TouchPhase, TouchSample,
};

#[cfg(not(target_arch = "wasm32"))]
pub use sync::NativeWebSocket;
