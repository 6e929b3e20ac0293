//! WebSocket transport between the authority and its replicas.
//!
//! Control messages are JSON text frames. Replication batches travel as binary
//! frames, each one a complete batch produced by a single flush.

use crate::codec::Role;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use thiserror::Error;

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room as the authority or as a replica
    Join { room: String, role: Role },
    /// Leave current room
    Leave,
}

/// Messages received from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined { room: String, peer_count: usize },
    PeerJoined { peer_id: String, role: Role },
    PeerLeft { peer_id: String },
    Error { message: String },
}

/// Transport errors
#[derive(Debug, Error, PartialEq)]
pub enum SyncError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    JoinedRoom { room: String, peer_count: usize },
    PeerJoined { peer_id: String, role: Role },
    PeerLeft { peer_id: String },
    /// One complete replication batch.
    BatchReceived(Bytes),
    Error { message: String },
}

impl From<ServerMessage> for SyncEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Joined { room, peer_count } => SyncEvent::JoinedRoom { room, peer_count },
            ServerMessage::PeerJoined { peer_id, role } => SyncEvent::PeerJoined { peer_id, role },
            ServerMessage::PeerLeft { peer_id } => SyncEvent::PeerLeft { peer_id },
            ServerMessage::Error { message } => SyncEvent::Error { message },
        }
    }
}

/// The byte-stream boundary of a replication channel.
///
/// Implementations must deliver each batch as one unit, in send order.
pub trait BatchTransport {
    fn send_batch(&mut self, batch: Bytes) -> Result<(), SyncError>;

    fn send_message(&mut self, msg: &ClientMessage) -> Result<(), SyncError>;

    /// Pending events since the last poll (non-blocking).
    fn poll_events(&mut self) -> Vec<SyncEvent>;
}

// ============================================================================
// In-process transport
// ============================================================================

/// Transport connecting two engines in one process, playing the relay's part
/// for a single authority/replica pair.
pub struct MemoryTransport {
    peer_id: String,
    role: Option<Role>,
    peer_tx: Sender<SyncEvent>,
    rx: Receiver<SyncEvent>,
    local: VecDeque<SyncEvent>,
}

impl MemoryTransport {
    /// Two connected ends. Both start with a pending `Connected` event.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = channel();
        let (b_tx, b_rx) = channel();
        let end = |peer_id: &str, peer_tx, rx| Self {
            peer_id: peer_id.to_string(),
            role: None,
            peer_tx,
            rx,
            local: VecDeque::from([SyncEvent::Connected]),
        };
        (end("memory-a", b_tx, a_rx), end("memory-b", a_tx, b_rx))
    }

    /// Role announced by the last join, if any.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    fn deliver(&self, event: SyncEvent) -> Result<(), SyncError> {
        self.peer_tx.send(event).map_err(|_| SyncError::NotConnected)
    }
}

impl BatchTransport for MemoryTransport {
    fn send_batch(&mut self, batch: Bytes) -> Result<(), SyncError> {
        if self.role != Some(Role::Authority) {
            return Err(SyncError::Send("only the authority sends batches".to_string()));
        }
        self.deliver(SyncEvent::BatchReceived(batch))
    }

    fn send_message(&mut self, msg: &ClientMessage) -> Result<(), SyncError> {
        match msg {
            ClientMessage::Join { room, role } => {
                self.role = Some(*role);
                self.local.push_back(SyncEvent::JoinedRoom { room: room.clone(), peer_count: 2 });
                self.deliver(SyncEvent::PeerJoined { peer_id: self.peer_id.clone(), role: *role })
            }
            ClientMessage::Leave => {
                self.role = None;
                self.deliver(SyncEvent::PeerLeft { peer_id: self.peer_id.clone() })
            }
        }
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        let mut events: Vec<SyncEvent> = self.local.drain(..).collect();
        events.extend(self.rx.try_iter());
        events
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::TryRecvError;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{connect, Message};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Text(String),
        Binary(Bytes),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<SyncEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to the relay. Messages sent before the socket opens are
        /// queued and go out once it does.
        pub fn connect(&mut self, url: &str) -> Result<(), SyncError> {
            if self.cmd_tx.is_some() {
                return Err(SyncError::AlreadyConnected);
            }

            let parsed_url = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(SyncError::InvalidUrl(format!(
                    "Invalid WebSocket URL scheme: {}",
                    parsed_url.scheme()
                )));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }

        fn command(&self, cmd: WsCommand) -> Result<(), SyncError> {
            match self.cmd_tx {
                Some(ref tx) => tx.send(cmd).map_err(|e| SyncError::Send(e.to_string())),
                None => Err(SyncError::NotConnected),
            }
        }
    }

    impl BatchTransport for NativeWebSocket {
        fn send_batch(&mut self, batch: Bytes) -> Result<(), SyncError> {
            self.command(WsCommand::Binary(batch))
        }

        fn send_message(&mut self, msg: &ClientMessage) -> Result<(), SyncError> {
            let json = serde_json::to_string(msg).map_err(|e| SyncError::Encode(e.to_string()))?;
            self.command(WsCommand::Text(json))
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        _ => {}
                    }
                    self.events.push(event);
                }
            }
            std::mem::take(&mut self.events)
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    fn run_socket(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<SyncEvent>) {
        log::info!("WebSocket thread: connecting to {}", url);

        let (mut socket, response) = match connect(&url) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(SyncEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        log::info!("WebSocket connected, status: {}", response.status());
        let _ = event_tx.send(SyncEvent::Connected);

        match socket.get_mut() {
            tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(5)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => {
                log::debug!("TLS or other stream - using default timeout handling");
            }
        }

        'io: loop {
            // Drain every queued command so batches are not held back by reads.
            loop {
                let outgoing = match cmd_rx.try_recv() {
                    Ok(WsCommand::Text(msg)) => Message::Text(msg),
                    Ok(WsCommand::Binary(batch)) => Message::Binary(batch.to_vec()),
                    Ok(WsCommand::Close) => {
                        log::info!("WebSocket close requested");
                        let _ = socket.close(None);
                        break 'io;
                    }
                    Err(TryRecvError::Disconnected) => {
                        log::info!("WebSocket command channel disconnected");
                        break 'io;
                    }
                    Err(TryRecvError::Empty) => break,
                };
                if let Err(e) = socket.send(outgoing) {
                    log::error!("WebSocket send error: {}", e);
                    break 'io;
                }
            }

            match socket.read() {
                Ok(Message::Binary(data)) => {
                    log::debug!("WebSocket received batch of {} bytes", data.len());
                    let _ = event_tx.send(SyncEvent::BatchReceived(Bytes::from(data)));
                }
                Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                    Ok(msg) => {
                        let _ = event_tx.send(msg.into());
                    }
                    Err(_) => log::warn!("Failed to parse server message: {}", txt),
                },
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(SyncEvent::Disconnected);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;
