use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::scheduler::{JobKey, JobKind, JobScheduler};
use game_core::{
    Action, AnswerCollector, DEFAULT_SESSION_TTL, EngineError, EngineResult, GameEvent,
    GameEventBus, RoomRepository, RoundStateMachine, SessionStore, StartOutcome, new_game_id,
    random_player, validate_game_id, validate_nickname,
};
use game_types::{
    AnswerSet, DEFAULT_LETTERS, GameConfig, GameId, GameMode, GameSettings, GameState, Player,
    Room, Scores, Stage,
};

const MAX_ID_ATTEMPTS: usize = 8;
const MIN_FINALIZE_RETRY: Duration = Duration::from_millis(50);
const MAX_FINALIZE_RETRY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GameManagerSettings {
    /// Sliding lifetime of room and player records
    pub session_ttl: Duration,
    /// How long submissions are still accepted after a round is stopped
    pub finalize_grace: Duration,
}

impl Default for GameManagerSettings {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            finalize_grace: Duration::from_millis(1000),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Room service: serializes commands per room, persists through the session
/// store, schedules deferred jobs and publishes the resulting events.
pub struct GameManager {
    repository: RoomRepository,
    answers: AnswerCollector,
    events: GameEventBus,
    scheduler: JobScheduler,
    room_locks: DashMap<GameId, Arc<RwLock<()>>>,
    settings: GameManagerSettings,
}

impl GameManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        events: GameEventBus,
        settings: GameManagerSettings,
    ) -> Self {
        Self {
            repository: RoomRepository::new(store.clone(), settings.session_ttl),
            answers: AnswerCollector::new(store),
            events,
            scheduler: JobScheduler::new(),
            room_locks: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &GameManagerSettings {
        &self.settings
    }

    fn room_lock(&self, game_id: &str) -> Arc<RwLock<()>> {
        self.room_locks
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    async fn require_player(&self, player_id: &str) -> EngineResult<Player> {
        self.repository
            .load_player(player_id)
            .await?
            .ok_or_else(|| EngineError::not_found("player", player_id))
    }

    /// Restore a known player or create a fresh one
    pub async fn identify(&self, player_id: Option<&str>) -> EngineResult<Player> {
        if let Some(player_id) = player_id {
            if let Some(player) = self.repository.load_player(player_id).await? {
                // Rewrite to slide the TTL
                self.repository.save_player(&player).await?;
                debug!("Restored player {} ({})", player.id, player.name);
                return Ok(player);
            }
        }

        let player = random_player(&mut rand::rng());
        self.repository.save_player(&player).await?;
        info!("Created player {} ({})", player.id, player.name);
        Ok(player)
    }

    pub async fn create_game(
        &self,
        player_id: &str,
        settings: Option<GameSettings>,
    ) -> EngineResult<Room> {
        let player = self.require_player(player_id).await?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let game_id = new_game_id(&mut rand::rng());
            let mut room = Room {
                config: GameConfig::default_for(game_id.clone()),
                players: vec![player.clone()],
                state: GameState::new(),
            };
            room.config.last_author = Some(player.id.clone());
            if let Some(settings) = settings.clone() {
                RoundStateMachine::update_settings(&mut room, settings, &player.id)?;
            }

            if self.try_create_room(&room).await? {
                info!("Player {} created game {}", player.id, game_id);
                return Ok(room);
            }
            debug!("Game id {} already taken, retrying", game_id);
        }

        Err(EngineError::Store(
            "could not allocate a unique game id".to_string(),
        ))
    }

    /// Persist a new room under its own lock. Returns false if the id is taken.
    async fn try_create_room(&self, room: &Room) -> EngineResult<bool> {
        let lock = self.room_lock(&room.config.id);
        let _guard = lock.write().await;

        match self.repository.create_room(room).await {
            Ok(()) => Ok(true),
            Err(EngineError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn join_game(&self, game_id: &str, player_id: &str) -> EngineResult<Room> {
        validate_game_id(game_id)?;
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let player = self.require_player(player_id).await?;
        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;

        match room.players.iter_mut().find(|p| p.id == player.id) {
            Some(existing) => *existing = player.clone(),
            None => room.players.push(player.clone()),
        }
        self.repository.save_room(&mut room, version).await?;

        info!(
            "Player {} joined game {} ({} players)",
            player.id,
            game_id,
            room.players.len()
        );
        self.events
            .publish(GameEvent::PlayerJoined {
                game_id: game_id.to_string(),
                players: room.players.clone(),
            })
            .await;
        Ok(room)
    }

    /// Drop a player from the roster. Their scratch answers stay so a round in
    /// flight still scores them.
    pub async fn leave_game(&self, game_id: &str, player_id: &str) -> EngineResult<()> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        let before = room.players.len();
        room.players.retain(|p| p.id != player_id);
        if room.players.len() == before {
            return Err(EngineError::not_found("player", player_id));
        }
        self.repository.save_room(&mut room, version).await?;

        info!("Player {} left game {}", player_id, game_id);
        self.events
            .publish(GameEvent::PlayerLeft {
                game_id: game_id.to_string(),
                players: room.players,
            })
            .await;
        Ok(())
    }

    pub async fn update_config(
        &self,
        game_id: &str,
        player_id: &str,
        settings: GameSettings,
    ) -> EngineResult<GameConfig> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        RoundStateMachine::update_settings(&mut room, settings, player_id)?;
        self.repository.save_room(&mut room, version).await?;

        info!("Player {} changed the settings of game {}", player_id, game_id);
        self.events
            .publish(GameEvent::ConfigChanged {
                config: room.config.clone(),
            })
            .await;
        Ok(room.config)
    }

    pub async fn update_nickname(
        &self,
        player_id: &str,
        name: &str,
        game_id: Option<&str>,
    ) -> EngineResult<Player> {
        let name = validate_nickname(name)?;
        let mut player = self.require_player(player_id).await?;
        player.name = name;
        self.repository.save_player(&player).await?;

        if let Some(game_id) = game_id {
            let lock = self.room_lock(game_id);
            let _guard = lock.write().await;

            let mut room = self.repository.load_room(game_id).await?;
            let version = room.state.version;
            if let Some(entry) = room.players.iter_mut().find(|p| p.id == player.id) {
                entry.name = player.name.clone();
                self.repository.save_room(&mut room, version).await?;
                self.events
                    .publish(GameEvent::PlayerRenamed {
                        game_id: game_id.to_string(),
                        players: room.players,
                    })
                    .await;
            }
        }
        Ok(player)
    }

    pub async fn start_round(self: &Arc<Self>, game_id: &str) -> EngineResult<GameState> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        let outcome = RoundStateMachine::start_round(&mut room, now_ms(), &mut rand::rng())?;

        match outcome {
            StartOutcome::GameFinished => {
                let candidates = successor_candidates(&room);
                self.reserve_successor(&mut room, candidates).await?;
                self.repository.save_room(&mut room, version).await?;
                self.after_game_finished(&room).await?;
            }
            StartOutcome::RoundStarted { index, .. } => {
                // Leftovers from a round whose cleanup failed must not leak in
                self.answers.clear_for_game(game_id).await?;
                self.repository.save_room(&mut room, version).await?;
                if room.config.mode == GameMode::Timer {
                    if let Some(limit) = room.config.time_limit_ms {
                        self.schedule_timeout(game_id, index, Duration::from_millis(limit));
                    }
                }
            }
        }

        self.events.publish(GameEvent::for_state(&room)).await;
        Ok(room.state)
    }

    pub async fn cancel_start(&self, game_id: &str) -> EngineResult<GameState> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        let submitted = self.answers.has_any_answers(game_id).await?;
        let round = RoundStateMachine::cancel_start(&mut room, submitted)?;
        self.repository.save_room(&mut room, version).await?;

        self.scheduler
            .cancel(&JobKey::new(game_id, round.index, JobKind::RoundTimeout));
        self.answers.clear_for_game(game_id).await?;

        self.events.publish(GameEvent::for_state(&room)).await;
        Ok(room.state)
    }

    /// Store a player's answers. Runs under the shared room lock, so many
    /// players can submit at once while transitions wait.
    pub async fn submit_answer(
        &self,
        game_id: &str,
        player_id: &str,
        answers: AnswerSet,
        category_index: Option<u32>,
    ) -> EngineResult<()> {
        let lock = self.room_lock(game_id);
        let _guard = lock.read().await;

        let state = self.repository.load_state(game_id).await?;
        Action::SubmitAnswer.check(state.stage)?;
        let round = state
            .current_round
            .as_ref()
            .ok_or_else(|| EngineError::not_found("round", game_id))?;

        let in_room = round.answers.contains_key(player_id)
            || self
                .repository
                .load_players(game_id)
                .await?
                .iter()
                .any(|p| p.id == player_id);
        if !in_room {
            return Err(EngineError::not_found("player", player_id));
        }

        self.answers.set(game_id, player_id, &answers).await?;
        debug!(
            "Player {} submitted {} answers in game {}",
            player_id,
            answers.len(),
            game_id
        );

        if let Some(category_index) = category_index {
            self.events
                .publish(GameEvent::OpponentProgress {
                    game_id: game_id.to_string(),
                    player_id: player_id.to_string(),
                    category_index,
                })
                .await;
        }
        Ok(())
    }

    pub async fn retrieve_answers(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> EngineResult<Option<AnswerSet>> {
        self.answers.get(game_id, player_id).await
    }

    pub async fn end_round(
        self: &Arc<Self>,
        game_id: &str,
        ended_by: Option<&str>,
    ) -> EngineResult<GameState> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let room = self.mark_round_ending(game_id, ended_by, None).await?;
        Ok(room.state)
    }

    /// Caller must hold the room's write lock. With `expected_round`, a room that
    /// moved on is reported as an illegal transition.
    async fn mark_round_ending(
        self: &Arc<Self>,
        game_id: &str,
        ended_by: Option<&str>,
        expected_round: Option<u32>,
    ) -> EngineResult<Room> {
        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;

        if let Some(expected) = expected_round {
            let current = room.state.current_round.as_ref().map(|r| r.index);
            if current != Some(expected) {
                return Err(EngineError::IllegalTransition {
                    action: Action::EndRound,
                    stage: room.state.stage,
                });
            }
        }

        let index = RoundStateMachine::end_round(&mut room, ended_by, now_ms())?;
        self.repository.save_room(&mut room, version).await?;

        self.scheduler
            .cancel(&JobKey::new(game_id, index, JobKind::RoundTimeout));
        self.schedule_finalize(game_id, index);

        self.events.publish(GameEvent::for_state(&room)).await;
        Ok(room)
    }

    fn schedule_finalize(self: &Arc<Self>, game_id: &str, round_index: u32) {
        self.schedule_finalize_in(game_id, round_index, self.settings.finalize_grace);
    }

    /// A finalize that hits a store outage or a lost race is retried with a
    /// doubling delay until it succeeds or the room moves on.
    fn schedule_finalize_in(self: &Arc<Self>, game_id: &str, round_index: u32, delay: Duration) {
        let manager = self.clone();
        let target = game_id.to_string();
        self.scheduler.schedule(
            JobKey::new(game_id, round_index, JobKind::Finalize),
            delay,
            async move {
                match manager.finalize_round(&target, round_index).await {
                    Ok(_) => {}
                    Err(e) if e.kind().is_retryable() => {
                        let retry_in = (delay * 2).clamp(MIN_FINALIZE_RETRY, MAX_FINALIZE_RETRY);
                        warn!(
                            "Finalize of game {} round {} failed, retrying in {:?}: {}",
                            target, round_index, retry_in, e
                        );
                        manager.schedule_finalize_in(&target, round_index, retry_in);
                    }
                    Err(e) => {
                        warn!("Finalize of game {} round {} abandoned: {}", target, round_index, e);
                    }
                }
            },
        );
    }

    fn schedule_timeout(self: &Arc<Self>, game_id: &str, round_index: u32, limit: Duration) {
        let manager = self.clone();
        let target = game_id.to_string();
        self.scheduler.schedule(
            JobKey::new(game_id, round_index, JobKind::RoundTimeout),
            limit,
            async move {
                if let Err(e) = manager.round_timeout(&target, round_index).await {
                    debug!("Timeout of game {} round {} skipped: {}", target, round_index, e);
                }
            },
        );
    }

    /// Time limit of a timer-mode round ran out
    pub async fn round_timeout(self: &Arc<Self>, game_id: &str, round_index: u32) -> EngineResult<()> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        info!("Time is up for game {} round {}", game_id, round_index);
        self.mark_round_ending(game_id, None, Some(round_index))
            .await
            .map(|_| ())
    }

    /// Score the round once the grace window closes. Returns false without
    /// touching anything when the room is no longer ending this round.
    pub async fn finalize_round(&self, game_id: &str, round_index: u32) -> EngineResult<bool> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        let current = room.state.current_round.as_ref().map(|r| r.index);
        if room.state.stage != Stage::Ending || current != Some(round_index) {
            debug!(
                "Skipping finalize for game {} round {}: stage {}, current round {:?}",
                game_id, round_index, room.state.stage, current
            );
            return Ok(false);
        }

        let collected = self.answers.get_all_for_game(game_id).await?;
        RoundStateMachine::finalize_round(&mut room, round_index, collected)?;
        self.repository.save_room(&mut room, version).await?;
        // The round is scored; the next start_round clears anything left behind
        if let Err(e) = self.answers.clear_for_game(game_id).await {
            warn!("Could not clear answers of game {}: {}", game_id, e);
        }

        self.events.publish(GameEvent::for_state(&room)).await;
        Ok(true)
    }

    pub async fn vote_answer(
        &self,
        game_id: &str,
        player_id: &str,
        category: &str,
        accepted: bool,
    ) -> EngineResult<Scores> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        let scores = RoundStateMachine::vote(&mut room, player_id, category, accepted)?;
        self.repository.save_room(&mut room, version).await?;

        self.events
            .publish(GameEvent::ScoresUpdated {
                game_id: game_id.to_string(),
                scores: scores.clone(),
            })
            .await;
        Ok(scores)
    }

    pub async fn end_game(&self, game_id: &str) -> EngineResult<GameState> {
        let lock = self.room_lock(game_id);
        let _guard = lock.write().await;

        let mut room = self.repository.load_room(game_id).await?;
        let version = room.state.version;
        RoundStateMachine::end_game(&mut room, new_game_id(&mut rand::rng()))?;
        let candidates = successor_candidates(&room);
        self.reserve_successor(&mut room, candidates).await?;
        self.repository.save_room(&mut room, version).await?;
        self.after_game_finished(&room).await?;

        self.events.publish(GameEvent::for_state(&room)).await;
        Ok(room.state)
    }

    /// Create the follow-up room of a finished game before the finish is saved,
    /// so its id can never be handed to another host. Settings carry over with
    /// the full alphabet restored; the roster starts empty.
    async fn reserve_successor(
        &self,
        room: &mut Room,
        candidates: impl IntoIterator<Item = GameId>,
    ) -> EngineResult<()> {
        let game_id = room.config.id.clone();
        for next_game_id in candidates.into_iter().take(MAX_ID_ATTEMPTS) {
            // Never wait on the lock of a live room while holding our own
            if next_game_id == game_id || self.repository.room_exists(&next_game_id).await? {
                debug!("Successor id {} already taken, retrying", next_game_id);
                continue;
            }
            let mut config = room.config.clone();
            config.id = next_game_id.clone();
            config.letters = DEFAULT_LETTERS.to_string();
            let successor = Room {
                config,
                players: Vec::new(),
                state: GameState::new(),
            };

            if self.try_create_room(&successor).await? {
                self.repository
                    .set_previous_game(&next_game_id, &game_id)
                    .await?;
                info!("Reserved game {} to follow {}", next_game_id, game_id);
                room.state.next_game_id = Some(next_game_id);
                return Ok(());
            }
            debug!("Successor id {} already taken, retrying", next_game_id);
        }

        Err(EngineError::Store(
            "could not allocate a unique game id".to_string(),
        ))
    }

    async fn after_game_finished(&self, room: &Room) -> EngineResult<()> {
        let game_id = &room.config.id;
        let cancelled = self.scheduler.cancel_game(game_id);
        if cancelled > 0 {
            debug!("Cancelled {} jobs of finished game {}", cancelled, game_id);
        }
        self.answers.clear_for_game(game_id).await?;
        if let Some(next_game_id) = &room.state.next_game_id {
            self.repository.set_next_game(game_id, next_game_id).await?;
        }
        Ok(())
    }

    /// Move a player from a finished game into the successor reserved for it
    pub async fn join_next_game(&self, game_id: &str, player_id: &str) -> EngineResult<Room> {
        let next_game_id = {
            let lock = self.room_lock(game_id);
            let _guard = lock.read().await;

            let room = self.repository.load_room(game_id).await?;
            if room.state.stage != Stage::Finished {
                return Err(EngineError::validation(format!(
                    "game {} has not finished yet",
                    game_id
                )));
            }
            let next_game_id = match room.state.next_game_id.clone() {
                Some(id) => id,
                None => self
                    .repository
                    .next_game(game_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("next game", game_id))?,
            };

            // The successor may have expired and its id been reused
            let previous = self.repository.previous_game(&next_game_id).await?;
            if previous.as_deref() != Some(game_id) {
                return Err(EngineError::not_found("next game", next_game_id));
            }
            self.repository
                .set_previous_game(&next_game_id, game_id)
                .await?;
            next_game_id
        };

        self.join_game(&next_game_id, player_id).await
    }

    pub async fn get_room(&self, game_id: &str) -> EngineResult<Room> {
        validate_game_id(game_id)?;
        self.repository.load_room(game_id).await
    }

    pub async fn list_rooms(&self) -> EngineResult<Vec<GameId>> {
        self.repository.list_games().await
    }

    pub fn pending_jobs(&self) -> Vec<JobKey> {
        self.scheduler.pending()
    }

    /// Wipe every room and player, cancelling all pending jobs first
    pub async fn flush_all(&self) -> EngineResult<()> {
        let cancelled = self.scheduler.cancel_all();
        self.repository.store().flush().await?;
        self.room_locks.clear();
        warn!("Flushed all session state ({} jobs cancelled)", cancelled);
        Ok(())
    }

    /// Purge expired records and forget locks of rooms that no longer exist
    pub async fn cleanup_expired(&self) -> EngineResult<usize> {
        let purged = self.repository.store().purge_expired().await?;
        let orphaned = self.clear_orphaned_answers().await?;

        let known: Vec<GameId> = self.room_locks.iter().map(|e| e.key().clone()).collect();
        for game_id in known {
            if !self.repository.room_exists(&game_id).await? {
                self.room_locks.remove(&game_id);
                self.scheduler.cancel_game(&game_id);
            }
        }

        if purged > 0 || orphaned > 0 {
            info!(
                "Purged {} expired session entries and answers of {} vanished games",
                purged, orphaned
            );
        }
        Ok(purged)
    }

    /// Scratch answers carry no TTL, so drop those whose room has expired
    async fn clear_orphaned_answers(&self) -> EngineResult<usize> {
        let games: BTreeSet<GameId> = self.answers.games_with_answers().await?;
        let mut cleared = 0;
        for game_id in games {
            let lock = self.room_lock(&game_id);
            let _guard = lock.write().await;
            if !self.repository.room_exists(&game_id).await? {
                self.answers.clear_for_game(&game_id).await?;
                debug!("Cleared orphaned answers of game {}", game_id);
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

/// Ids to try for a finished game's successor: the one the state machine
/// picked, then fresh ones
fn successor_candidates(room: &Room) -> Vec<GameId> {
    room.state
        .next_game_id
        .iter()
        .cloned()
        .chain((0..MAX_ID_ATTEMPTS).map(|_| new_game_id(&mut rand::rng())))
        .take(MAX_ID_ATTEMPTS)
        .collect()
}
