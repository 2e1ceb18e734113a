use game_types::{AnswerSet, Answers, GameId, PlayerId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::session_store::{SessionStore, keys};
use crate::EngineResult;

/// Scratch storage for in-flight answers. Kept apart from the round record so a
/// reconnecting player can fetch their own answers without seeing anyone else's
/// before the round is scored.
#[derive(Clone)]
pub struct AnswerCollector {
    store: Arc<dyn SessionStore>,
}

impl AnswerCollector {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Replace the player's answers; the last write wins
    pub async fn set(&self, game_id: &str, player_id: &str, answers: &AnswerSet) -> EngineResult<()> {
        let value = serde_json::to_string(answers)?;
        self.store
            .set(&keys::answers(game_id, player_id), value, None)
            .await
    }

    pub async fn get(&self, game_id: &str, player_id: &str) -> EngineResult<Option<AnswerSet>> {
        match self.store.get(&keys::answers(game_id, player_id)).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all_for_game(&self, game_id: &str) -> EngineResult<Answers> {
        let prefix = keys::answers_prefix(game_id);
        let mut all = Answers::new();
        for key in self.store.keys(&prefix).await? {
            let player_id: PlayerId = key[prefix.len()..].to_string();
            // Entry may vanish between listing and reading
            if let Some(value) = self.store.get(&key).await? {
                all.insert(player_id, serde_json::from_str(&value)?);
            }
        }
        Ok(all)
    }

    /// True once any player has written a non-blank answer
    pub async fn has_any_answers(&self, game_id: &str) -> EngineResult<bool> {
        let all = self.get_all_for_game(game_id).await?;
        Ok(all
            .values()
            .flat_map(|set| set.values())
            .any(|answer| !answer.trim().is_empty()))
    }

    /// Every game that still has scratch answers stored
    pub async fn games_with_answers(&self) -> EngineResult<BTreeSet<GameId>> {
        Ok(self
            .store
            .keys(keys::ANSWERS_PREFIX)
            .await?
            .iter()
            .filter_map(|key| key[keys::ANSWERS_PREFIX.len()..].split_once(':'))
            .map(|(game_id, _)| game_id.to_string())
            .collect())
    }

    pub async fn clear_for_game(&self, game_id: &str) -> EngineResult<()> {
        let keys = self.store.keys(&keys::answers_prefix(game_id)).await?;
        debug!("Clearing {} answer sets for game {}", keys.len(), game_id);
        for key in keys {
            self.store.del(&key).await?;
        }
        Ok(())
    }
}
