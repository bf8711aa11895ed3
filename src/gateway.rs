//! Protocol gateway and broadcast fan-out
//!
//! ## Table of Contents
//! - **ClientRegistry**: Live connection set with all / all-but-sender fan-out
//! - **ws_handler**: Axum WebSocket upgrade endpoint
//! - **dispatch**: Inbound intent demultiplexer
//!
//! Each connection owns a reader loop and a writer task joined by a bounded
//! queue; a consumer that cannot keep up is dropped so the tick never waits
//! on a socket. All world mutations happen under the shared write lock, and
//! the snapshots those mutations broadcast are captured under the same lock.

use crate::error::ServerError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::{ConnectionId, PlayerId};
use crate::world::WorldState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Outbound queue depth per connection. A consumer this far behind is
/// dropped rather than allowed to stall everyone else.
const OUTBOUND_QUEUE: usize = 256;

/// The world behind the runtime's lock.
pub type SharedWorld = Arc<RwLock<WorldState>>;

struct ConnectionHandle {
    player: Option<PlayerId>,
    tx: mpsc::Sender<Message>,
}

/// Live connection set shared by the gateway and the tick loop.
#[derive(Default)]
pub struct ClientRegistry {
    connections: DashMap<ConnectionId, ConnectionHandle>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether any connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn register(&self, id: ConnectionId, tx: mpsc::Sender<Message>) {
        self.connections.insert(id, ConnectionHandle { player: None, tx });
    }

    fn bind_player(&self, id: ConnectionId, player: PlayerId) {
        if let Some(mut handle) = self.connections.get_mut(&id) {
            handle.player = Some(player);
        }
    }

    fn player_of(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&id).and_then(|h| h.player.clone())
    }

    /// Drop a connection, returning the player it had bound.
    fn remove(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connections.remove(&id).and_then(|(_, h)| h.player)
    }

    /// Send one event to one connection.
    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) {
        match message.to_text() {
            Ok(text) => self.deliver(&[id], &text),
            Err(e) => warn!(error = %e, "dropping unserializable event"),
        }
    }

    /// Send one event to every connection.
    pub fn broadcast_all(&self, message: &ServerMessage) {
        let targets: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        match message.to_text() {
            Ok(text) => self.deliver(&targets, &text),
            Err(e) => warn!(error = %e, "dropping unserializable event"),
        }
    }

    /// Send one event to every connection except `sender`.
    pub fn broadcast_except(&self, sender: ConnectionId, message: &ServerMessage) {
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|e| *e.key())
            .filter(|id| *id != sender)
            .collect();
        match message.to_text() {
            Ok(text) => self.deliver(&targets, &text),
            Err(e) => warn!(error = %e, "dropping unserializable event"),
        }
    }

    /// Deliver a serialized frame, dropping connections whose queue is
    /// full or closed.
    fn deliver(&self, targets: &[ConnectionId], text: &str) {
        let mut dead = Vec::new();
        for id in targets {
            if let Some(handle) = self.connections.get(id) {
                if handle.tx.try_send(Message::Text(text.to_string())).is_err() {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            warn!(connection = %id, "outbound queue overflow, dropping connection");
            self.connections.remove(&id);
        }
    }
}

/// State shared with the axum handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The simulation behind its lock
    pub world: SharedWorld,
    /// The live connection set
    pub registry: Arc<ClientRegistry>,
}

/// WebSocket upgrade endpoint.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection reader loop; spawns the paired writer task.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let connection = ConnectionId::new();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    state.registry.register(connection, tx);
    info!(connection = %connection, "client connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match ClientMessage::from_text(&text) {
                Ok(message) => dispatch(connection, message, &state).await,
                Err(e) => debug!(connection = %connection, error = %e, "dropping malformed message"),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!(connection = %connection, error = %e, "socket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup runs at most once: the registry entry is the guard.
    if let Some(player) = state.registry.remove(connection) {
        let events = {
            let mut world = state.world.write().await;
            world.remove_player(&player, Instant::now())
        };
        for event in events.into_iter().flatten() {
            state.registry.broadcast_all(&event);
        }
    }
    writer.abort();
    info!(connection = %connection, "client disconnected");
}

/// Route one inbound intent. Rejected intents are logged and answered
/// with silence.
pub(crate) async fn dispatch(connection: ConnectionId, message: ClientMessage, state: &GatewayState) {
    match message {
        ClientMessage::PlayerJoin {
            player_id,
            username,
            position,
            rotation,
        } => {
            if state.registry.player_of(connection).is_some() {
                warn!(connection = %connection, "join on an already-bound connection");
                return;
            }
            let (join, snapshot) = {
                let mut world = state.world.write().await;
                match world.join_player(
                    player_id.clone(),
                    username,
                    position.into(),
                    rotation.into(),
                ) {
                    Ok(join) => (join, world.snapshot()),
                    Err(e) => return log_rejection(connection, &e),
                }
            };
            state.registry.bind_player(connection, player_id);
            state.registry.broadcast_except(connection, &join);
            state.registry.send_to(connection, &snapshot);
        }

        ClientMessage::PlayerUpdate {
            player_id,
            position,
            rotation,
            held_stones,
        } => {
            let Some(bound) = state.registry.player_of(connection) else {
                return warn!(connection = %connection, "update before join");
            };
            if bound != player_id {
                return warn!(connection = %connection, claimed = %player_id, "update for a foreign player");
            }
            let result = {
                let mut world = state.world.write().await;
                world.update_player(&bound, position.into(), rotation.into(), held_stones)
            };
            match result {
                Ok(update) => state.registry.broadcast_except(connection, &update),
                Err(e) => log_rejection(connection, &e),
            }
        }

        ClientMessage::RequestState => {
            let snapshot = {
                let world = state.world.read().await;
                world.snapshot()
            };
            state.registry.send_to(connection, &snapshot);
        }

        ClientMessage::StonePickup { stone_id } => {
            let Some(player) = state.registry.player_of(connection) else {
                return warn!(connection = %connection, "pickup before join");
            };
            let result = {
                let mut world = state.world.write().await;
                world.pickup_stone(&player, stone_id)
            };
            match result {
                Ok(event) => state.registry.broadcast_all(&event),
                Err(e) => log_rejection(connection, &e),
            }
        }

        ClientMessage::StoneThrow {
            stone_id, velocity, ..
        } => {
            let Some(player) = state.registry.player_of(connection) else {
                return warn!(connection = %connection, "throw before join");
            };
            let result = {
                let mut world = state.world.write().await;
                world.throw_stone(&player, stone_id, velocity.into(), Instant::now())
            };
            match result {
                Ok(event) => state.registry.broadcast_all(&event),
                Err(e) => log_rejection(connection, &e),
            }
        }

        ClientMessage::TowerDestack { tower_id } => {
            let Some(player) = state.registry.player_of(connection) else {
                return warn!(connection = %connection, "destack before join");
            };
            let result = {
                let mut world = state.world.write().await;
                world.destack_tower(&player, tower_id)
            };
            match result {
                Ok(events) => {
                    for event in &events {
                        state.registry.broadcast_all(event);
                    }
                }
                Err(e) => log_rejection(connection, &e),
            }
        }
    }
}

fn log_rejection(connection: ConnectionId, error: &ServerError) {
    if error.is_rejection() {
        debug!(connection = %connection, reason = %error, "intent rejected");
    } else {
        warn!(connection = %connection, error = %error, "intent failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::protocol::WireVec3;

    fn quiet_state() -> GatewayState {
        let mut config = GameConfig::default();
        config.world.cloud_count = 0;
        GatewayState {
            world: Arc::new(RwLock::new(WorldState::new(config))),
            registry: Arc::new(ClientRegistry::new()),
        }
    }

    fn attach(state: &GatewayState) -> (ConnectionId, mpsc::Receiver<Message>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        state.registry.register(id, tx);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    fn zero() -> WireVec3 {
        WireVec3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    fn join_message(id: &str) -> ClientMessage {
        ClientMessage::PlayerJoin {
            player_id: PlayerId::new(id),
            username: id.into(),
            position: WireVec3 {
                x: 0.0,
                y: 2.0,
                z: 0.0,
            },
            rotation: zero(),
        }
    }

    #[tokio::test]
    async fn test_join_sends_snapshot_and_informs_others() {
        let state = quiet_state();
        let (watcher, mut watcher_rx) = attach(&state);
        let (joiner, mut joiner_rx) = attach(&state);
        let _ = watcher;

        dispatch(joiner, join_message("alice"), &state).await;

        let to_joiner = drain(&mut joiner_rx);
        assert_eq!(to_joiner.len(), 1);
        assert_eq!(to_joiner[0]["type"], "initial_state");
        assert_eq!(to_joiner[0]["players"][0]["playerId"], "alice");

        let to_watcher = drain(&mut watcher_rx);
        assert_eq!(to_watcher.len(), 1);
        assert_eq!(to_watcher[0]["type"], "player_join");
        assert_eq!(to_watcher[0]["playerId"], "alice");
    }

    #[tokio::test]
    async fn test_rejected_pickup_is_silent() {
        let state = quiet_state();
        let (conn, mut rx) = attach(&state);
        dispatch(conn, join_message("alice"), &state).await;
        drain(&mut rx);

        dispatch(
            conn,
            ClientMessage::StonePickup {
                stone_id: crate::types::StoneId::new(999),
            },
            &state,
        )
        .await;
        assert!(drain(&mut rx).is_empty(), "no confirming broadcast expected");
    }

    #[tokio::test]
    async fn test_pickup_broadcast_reaches_everyone() {
        let state = quiet_state();
        let (a, mut a_rx) = attach(&state);
        let (b, mut b_rx) = attach(&state);
        dispatch(a, join_message("alice"), &state).await;
        dispatch(b, join_message("bob"), &state).await;

        let stone_id = {
            let mut world = state.world.write().await;
            world.insert_stone(glam::Vec3::new(1.0, 1.0, 0.0)).id
        };
        drain(&mut a_rx);
        drain(&mut b_rx);

        dispatch(a, ClientMessage::StonePickup { stone_id }, &state).await;

        for rx in [&mut a_rx, &mut b_rx] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "stone_pickup");
            assert_eq!(frames[0]["playerId"], "alice");
        }
    }

    #[tokio::test]
    async fn test_update_for_foreign_player_ignored() {
        let state = quiet_state();
        let (a, mut a_rx) = attach(&state);
        let (b, mut b_rx) = attach(&state);
        dispatch(a, join_message("alice"), &state).await;
        dispatch(b, join_message("bob"), &state).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        dispatch(
            a,
            ClientMessage::PlayerUpdate {
                player_id: PlayerId::new("bob"),
                position: zero(),
                rotation: zero(),
                held_stones: Vec::new(),
            },
            &state,
        )
        .await;

        assert!(drain(&mut b_rx).is_empty());
        let world = state.world.read().await;
        // Bob keeps his join pose; the spoofed update never applied.
        assert_eq!(
            world.players[&PlayerId::new("bob")].position,
            glam::Vec3::new(0.0, 2.0, 0.0)
        );
    }

    #[tokio::test]
    async fn test_overflowing_consumer_is_dropped() {
        let state = quiet_state();
        let (slow, _slow_rx) = attach(&state);
        let _keep_alive = _slow_rx; // never drained

        let event = ServerMessage::KingUpdate { king_id: None };
        for _ in 0..(OUTBOUND_QUEUE + 1) {
            state.registry.broadcast_all(&event);
        }
        assert!(state.registry.is_empty(), "saturated connection must be dropped");
        let _ = slow;
    }
}
