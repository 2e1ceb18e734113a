use async_trait::async_trait;
use game_core::{GameEvent, GameEventHandler};
use game_types::{GameId, PlayerId, ServerMessage};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub player_id: Option<PlayerId>,
    pub game_id: Option<GameId>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        let connection = Self {
            id,
            player_id: None,
            game_id: None,
            connected_at: now,
            last_activity: now,
            sender,
        };

        (connection, receiver)
    }

    pub fn update_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    pub fn is_inactive(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    fn is_in_game(&self, game_id: &str) -> bool {
        self.game_id.as_deref() == Some(game_id)
    }
}

/// Live websocket connections and the player/room each one is bound to
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_connection(
        &self,
        id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (conn, receiver) = Connection::new(id);

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        receiver
    }

    /// Returns the removed connection, or None if it was already gone
    pub async fn remove_connection(&self, id: ConnectionId) -> Option<Connection> {
        let mut connections = self.connections.write().await;
        connections.remove(&id)
    }

    pub async fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        let connections = self.connections.read().await;
        connections.get(&id).cloned()
    }

    pub async fn set_connection_player(&self, id: ConnectionId, player_id: PlayerId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.player_id = Some(player_id);
        }
    }

    pub async fn set_connection_game(&self, id: ConnectionId, game_id: Option<GameId>) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.game_id = game_id;
        }
    }

    pub async fn update_activity(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.update_activity();
        }
    }

    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        message: ServerMessage,
    ) -> Result<(), String> {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(&id) {
            connection.send_message(message)
        } else {
            Err("Connection not found".to_string())
        }
    }

    pub async fn send_to_game(&self, game_id: &str, message: ServerMessage) {
        self.send_to_game_except_player(game_id, None, message).await
    }

    pub async fn send_to_game_except_player(
        &self,
        game_id: &str,
        excluded: Option<&str>,
        message: ServerMessage,
    ) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            if !connection.is_in_game(game_id) {
                continue;
            }
            if excluded.is_some() && connection.player_id.as_deref() == excluded {
                continue;
            }
            let _ = connection.send_message(message.clone());
        }
    }

    /// Drop idle connections and hand them back so their players can be
    /// removed from their rooms
    pub async fn cleanup_inactive_connections(&self, timeout: Duration) -> Vec<Connection> {
        let mut connections = self.connections.write().await;
        let inactive: Vec<ConnectionId> = connections
            .values()
            .filter(|conn| conn.is_inactive(timeout))
            .map(|conn| conn.id)
            .collect();

        inactive
            .into_iter()
            .filter_map(|id| {
                tracing::info!("Removing inactive connection: {}", id);
                connections.remove(&id)
            })
            .collect()
    }

    pub async fn get_connections_in_game(&self, game_id: &str) -> Vec<ConnectionId> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.is_in_game(game_id))
            .map(|conn| conn.id)
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameEventHandler for ConnectionManager {
    async fn handle_event(&self, event: &GameEvent) {
        self.send_to_game_except_player(event.game_id(), event.excluded_player(), event.to_message())
            .await;
    }
}
