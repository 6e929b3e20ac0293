//! Stagehand WebSocket Relay Server
//!
//! Relays replication batches from one authority to the replicas in its room.
//!
//! ## Protocol
//!
//! Control messages are JSON text frames:
//! ```json
//! { "type": "join", "room": "wall", "role": "authority" }
//! { "type": "join", "room": "wall", "role": "replica" }
//! { "type": "leave" }
//! ```
//! Batches are binary frames. Only the room's authority may send them; they
//! are forwarded unchanged to every replica. A replica that falls behind the
//! room channel is sent an error and disconnected, so it can rejoin and get a
//! full resync.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use stagehand_core::{ClientMessage, Role, ServerMessage};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// Something that happened in a room, tagged with the peer that caused it.
#[derive(Debug, Clone)]
enum RoomEvent {
    Control(ServerMessage),
    Batch(Bytes),
}

/// Room state
struct Room {
    tx: broadcast::Sender<(String, RoomEvent)>,
    peers: HashMap<String, Role>,
    authority: Option<String>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashMap::new(),
            authority: None,
        }
    }
}

/// Shared application state
struct AppState {
    rooms: DashMap<String, Room>,
}

impl AppState {
    fn new() -> Self {
        Self { rooms: DashMap::new() }
    }

    /// Add a peer to a room. Fails when a second authority tries to join.
    fn join_room(
        &self,
        room_id: &str,
        peer_id: &str,
        role: Role,
    ) -> Result<(broadcast::Receiver<(String, RoomEvent)>, usize), String> {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        if role == Role::Authority {
            if room.authority.as_deref().is_some_and(|existing| existing != peer_id) {
                return Err(format!("Room {} already has an authority", room_id));
            }
            room.authority = Some(peer_id.to_string());
        }
        room.peers.insert(peer_id.to_string(), role);
        Ok((room.tx.subscribe(), room.peers.len()))
    }

    fn leave_room(&self, room_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.peers.remove(peer_id);
            if room.authority.as_deref() == Some(peer_id) {
                room.authority = None;
            }
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(room_id);
            }
        }
    }

    fn is_authority(&self, room_id: &str, peer_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.authority.as_deref() == Some(peer_id))
    }

    fn broadcast(&self, room_id: &str, from: &str, event: RoomEvent) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.to_string(), event));
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagehand_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = listen_addr();
    info!("Stagehand relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// Address from `STAGEHAND_ADDR`, falling back to the default.
fn listen_addr() -> SocketAddr {
    let fallback = SocketAddr::from(([0, 0, 0, 0], 3030));
    match std::env::var("STAGEHAND_ADDR") {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            warn!("Ignoring STAGEHAND_ADDR {:?}: {}, using {}", value, e, fallback);
            fallback
        }),
        Err(_) => fallback,
    }
}

async fn index() -> &'static str {
    "Stagehand Relay Server - Connect via WebSocket at /ws"
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn text(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode {:?}: {}", msg, e);
            None
        }
    }
}

/// Whether a peer with `role` receives `event` sent by someone else.
fn wants(role: Role, event: &RoomEvent) -> bool {
    match event {
        RoomEvent::Batch(_) => role == Role::Replica,
        RoomEvent::Control(_) => true,
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current: Option<(String, Role)> = None;
    let mut room_rx: Option<broadcast::Receiver<(String, RoomEvent)>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(raw))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&raw) {
                            Ok(ClientMessage::Join { room, role }) => {
                                if let Some((ref old_room, _)) = current {
                                    state.leave_room(old_room, &peer_id);
                                    state.broadcast(old_room, &peer_id, RoomEvent::Control(ServerMessage::PeerLeft {
                                        peer_id: peer_id.clone(),
                                    }));
                                }
                                current = None;
                                room_rx = None;

                                match state.join_room(&room, &peer_id, role) {
                                    Ok((rx, peer_count)) => {
                                        room_rx = Some(rx);
                                        current = Some((room.clone(), role));
                                        state.broadcast(&room, &peer_id, RoomEvent::Control(ServerMessage::PeerJoined {
                                            peer_id: peer_id.clone(),
                                            role,
                                        }));
                                        info!("Peer {} joined room {} as {:?}", peer_id, room, role);
                                        ServerMessage::Joined { room, peer_count }
                                    }
                                    Err(message) => {
                                        warn!("Peer {} refused: {}", peer_id, message);
                                        ServerMessage::Error { message }
                                    }
                                }
                            }
                            Ok(ClientMessage::Leave) => {
                                if let Some((ref room, _)) = current {
                                    state.leave_room(room, &peer_id);
                                    state.broadcast(room, &peer_id, RoomEvent::Control(ServerMessage::PeerLeft {
                                        peer_id: peer_id.clone(),
                                    }));
                                    info!("Peer {} left room {}", peer_id, room);
                                }
                                current = None;
                                room_rx = None;
                                continue;
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                ServerMessage::Error { message: format!("Invalid message: {}", e) }
                            }
                        };
                        if let Some(out) = text(&reply) {
                            if sender.send(out).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match current {
                            Some((ref room, _)) if state.is_authority(room, &peer_id) => {
                                debug!("Relaying batch of {} bytes in room {}", data.len(), room);
                                state.broadcast(room, &peer_id, RoomEvent::Batch(data));
                            }
                            _ => warn!("Dropping batch from non-authority peer {}", peer_id),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            event = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                let role = match current {
                    Some((_, role)) => role,
                    None => continue,
                };
                match event {
                    Ok((from, event)) => {
                        if from == peer_id || !wants(role, &event) {
                            continue;
                        }
                        let out = match event {
                            RoomEvent::Batch(data) => Some(Message::Binary(data)),
                            RoomEvent::Control(msg) => text(&msg),
                        };
                        if let Some(out) = out {
                            if sender.send(out).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Peer {} lagged by {} messages, disconnecting", peer_id, skipped);
                        if role == Role::Replica {
                            let message = format!("Lagged by {} messages, rejoin to resync", skipped);
                            if let Some(out) = text(&ServerMessage::Error { message }) {
                                let _ = sender.send(out).await;
                            }
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if let Some((ref room, _)) = current {
        state.leave_room(room, &peer_id);
        state.broadcast(room, &peer_id, RoomEvent::Control(ServerMessage::PeerLeft {
            peer_id: peer_id.clone(),
        }));
    }
    info!("Connection closed: {}", peer_id);
}
