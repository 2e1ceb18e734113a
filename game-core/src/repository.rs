use game_types::{GameConfig, GameId, GameState, Player, Room};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::session_store::{SessionStore, keys};
use crate::{EngineError, EngineResult};

/// Typed access to room and player records held in a [`SessionStore`]
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> EngineResult<Option<T>> {
        match self.store.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> EngineResult<()> {
        let value = serde_json::to_string(value)?;
        self.store.set(key, value, Some(self.ttl)).await
    }

    pub async fn load_player(&self, player_id: &str) -> EngineResult<Option<Player>> {
        self.get_json(&keys::player(player_id)).await
    }

    pub async fn save_player(&self, player: &Player) -> EngineResult<()> {
        self.set_json(&keys::player(&player.id), player).await
    }

    pub async fn room_exists(&self, game_id: &str) -> EngineResult<bool> {
        Ok(self.store.get(&keys::game_state(game_id)).await?.is_some())
    }

    /// Persist a brand new room; an existing room with the same id is a conflict
    pub async fn create_room(&self, room: &Room) -> EngineResult<()> {
        let game_id = &room.config.id;
        if self.room_exists(game_id).await? {
            return Err(EngineError::Conflict {
                game_id: game_id.clone(),
            });
        }
        // A reused id must not inherit a predecessor link
        self.store.del(&keys::previous_game(game_id)).await?;
        self.set_json(&keys::game_config(game_id), &room.config).await?;
        self.set_json(&keys::game_players(game_id), &room.players).await?;
        self.set_json(&keys::game_state(game_id), &room.state).await
    }

    pub async fn load_state(&self, game_id: &str) -> EngineResult<GameState> {
        self.get_json(&keys::game_state(game_id))
            .await?
            .ok_or_else(|| EngineError::not_found("game", game_id))
    }

    pub async fn load_players(&self, game_id: &str) -> EngineResult<Vec<Player>> {
        Ok(self
            .get_json(&keys::game_players(game_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn load_room(&self, game_id: &str) -> EngineResult<Room> {
        let state = self.load_state(game_id).await?;
        let config: GameConfig = self
            .get_json(&keys::game_config(game_id))
            .await?
            .ok_or_else(|| EngineError::not_found("game config", game_id))?;
        let players = self.load_players(game_id).await?;
        Ok(Room {
            config,
            players,
            state,
        })
    }

    pub async fn save_config(&self, config: &GameConfig) -> EngineResult<()> {
        self.set_json(&keys::game_config(&config.id), config).await
    }

    pub async fn save_players(&self, game_id: &str, players: &[Player]) -> EngineResult<()> {
        self.set_json(&keys::game_players(game_id), &players).await
    }

    /// Write the state only if nobody else wrote it since `expected_version` was read.
    /// Bumps `state.version` on success.
    pub async fn save_state(
        &self,
        game_id: &str,
        state: &mut GameState,
        expected_version: u64,
    ) -> EngineResult<()> {
        let current = self.load_state(game_id).await?;
        if current.version != expected_version {
            warn!(
                "Stale write to game {}: expected version {}, found {}",
                game_id, expected_version, current.version
            );
            return Err(EngineError::Conflict {
                game_id: game_id.to_string(),
            });
        }
        state.version = expected_version + 1;
        self.set_json(&keys::game_state(game_id), state).await
    }

    /// Persist every part of a room loaded at `expected_version`
    pub async fn save_room(&self, room: &mut Room, expected_version: u64) -> EngineResult<()> {
        let game_id = room.config.id.clone();
        self.save_state(&game_id, &mut room.state, expected_version)
            .await?;
        self.save_config(&room.config).await?;
        self.save_players(&game_id, &room.players).await
    }

    pub async fn set_next_game(&self, game_id: &str, next_game_id: &str) -> EngineResult<()> {
        self.set_json(&keys::next_game(game_id), &next_game_id).await
    }

    pub async fn next_game(&self, game_id: &str) -> EngineResult<Option<GameId>> {
        self.get_json(&keys::next_game(game_id)).await
    }

    /// Link a successor room back to the game it follows
    pub async fn set_previous_game(&self, game_id: &str, previous_game_id: &str) -> EngineResult<()> {
        self.set_json(&keys::previous_game(game_id), &previous_game_id).await
    }

    pub async fn previous_game(&self, game_id: &str) -> EngineResult<Option<GameId>> {
        self.get_json(&keys::previous_game(game_id)).await
    }

    /// Ids of every live room
    pub async fn list_games(&self) -> EngineResult<Vec<GameId>> {
        Ok(self
            .store
            .keys(keys::GAME_STATE_PREFIX)
            .await?
            .into_iter()
            .map(|key| key[keys::GAME_STATE_PREFIX.len()..].to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySessionStore;

    fn repository() -> RoomRepository {
        RoomRepository::new(Arc::new(MemorySessionStore::new()), Duration::from_secs(60))
    }

    fn room(id: &str) -> Room {
        Room {
            config: GameConfig::default_for(id),
            players: vec![Player::new("p1", "Alice", "#e6194b")],
            state: GameState::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_load_room() {
        let repo = repository();
        repo.create_room(&room("g1")).await.unwrap();

        let loaded = repo.load_room("g1").await.unwrap();
        assert_eq!(loaded, room("g1"));
        assert_eq!(repo.list_games().await.unwrap(), vec!["g1".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_room_is_conflict() {
        let repo = repository();
        repo.create_room(&room("g1")).await.unwrap();
        assert!(matches!(
            repo.create_room(&room("g1")).await,
            Err(EngineError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_room_is_not_found() {
        let repo = repository();
        assert!(matches!(
            repo.load_room("nope").await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_writer_gets_conflict() {
        let repo = repository();
        repo.create_room(&room("g1")).await.unwrap();

        let mut first = repo.load_room("g1").await.unwrap();
        let mut second = repo.load_room("g1").await.unwrap();

        repo.save_room(&mut first, 0).await.unwrap();
        assert_eq!(first.state.version, 1);

        let result = repo.save_room(&mut second, 0).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
        assert_eq!(repo.load_state("g1").await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_player_and_next_game_records() {
        let repo = repository();
        let player = Player::new("p9", "Zed", "#3cb44b");
        repo.save_player(&player).await.unwrap();
        assert_eq!(repo.load_player("p9").await.unwrap(), Some(player));

        assert_eq!(repo.next_game("g1").await.unwrap(), None);
        repo.set_next_game("g1", "g2").await.unwrap();
        assert_eq!(repo.next_game("g1").await.unwrap(), Some("g2".to_string()));
    }

    #[tokio::test]
    async fn test_recreated_room_drops_predecessor_link() {
        let repo = repository();
        repo.create_room(&room("g2")).await.unwrap();
        repo.set_previous_game("g2", "g1").await.unwrap();
        assert_eq!(repo.previous_game("g2").await.unwrap(), Some("g1".to_string()));

        repo.store().flush().await.unwrap();
        repo.create_room(&room("g2")).await.unwrap();
        assert_eq!(repo.previous_game("g2").await.unwrap(), None);
    }
}
