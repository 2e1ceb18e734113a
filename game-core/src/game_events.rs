use async_trait::async_trait;
use game_types::{GameConfig, GameId, GameState, Player, PlayerId, Room, Scores, ServerMessage};
use std::sync::Arc;

/// Room-level notifications produced by the engine
#[derive(Debug, Clone)]
pub enum GameEvent {
    PlayerJoined {
        game_id: GameId,
        players: Vec<Player>,
    },
    PlayerLeft {
        game_id: GameId,
        players: Vec<Player>,
    },
    PlayerRenamed {
        game_id: GameId,
        players: Vec<Player>,
    },
    ConfigChanged {
        config: GameConfig,
    },
    RoundStarted {
        game_id: GameId,
        state: GameState,
    },
    RoundCancelled {
        game_id: GameId,
        state: GameState,
    },
    RoundEnding {
        game_id: GameId,
        state: GameState,
    },
    RoundEnded {
        game_id: GameId,
        state: GameState,
    },
    GameFinished {
        game_id: GameId,
        state: GameState,
    },
    ScoresUpdated {
        game_id: GameId,
        scores: Scores,
    },
    OpponentProgress {
        game_id: GameId,
        player_id: PlayerId,
        category_index: u32,
    },
}

impl GameEvent {
    pub fn game_id(&self) -> &str {
        match self {
            GameEvent::PlayerJoined { game_id, .. } => game_id,
            GameEvent::PlayerLeft { game_id, .. } => game_id,
            GameEvent::PlayerRenamed { game_id, .. } => game_id,
            GameEvent::ConfigChanged { config } => &config.id,
            GameEvent::RoundStarted { game_id, .. } => game_id,
            GameEvent::RoundCancelled { game_id, .. } => game_id,
            GameEvent::RoundEnding { game_id, .. } => game_id,
            GameEvent::RoundEnded { game_id, .. } => game_id,
            GameEvent::GameFinished { game_id, .. } => game_id,
            GameEvent::ScoresUpdated { game_id, .. } => game_id,
            GameEvent::OpponentProgress { game_id, .. } => game_id,
        }
    }

    /// The member that caused the event and should not receive it, if any
    pub fn excluded_player(&self) -> Option<&str> {
        match self {
            GameEvent::OpponentProgress { player_id, .. } => Some(player_id),
            _ => None,
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        match self.clone() {
            GameEvent::PlayerJoined { players, .. } => ServerMessage::PlayerJoined { players },
            GameEvent::PlayerLeft { players, .. } => ServerMessage::PlayerLeft { players },
            GameEvent::PlayerRenamed { players, .. } => ServerMessage::PlayerRenamed { players },
            GameEvent::ConfigChanged { config } => ServerMessage::ConfigChanged { config },
            GameEvent::RoundStarted { state, .. } => ServerMessage::RoundStarted { state },
            GameEvent::RoundCancelled { state, .. } => ServerMessage::RoundCancelled { state },
            GameEvent::RoundEnding { state, .. } => ServerMessage::RoundEnding { state },
            GameEvent::RoundEnded { state, .. } => ServerMessage::RoundEnded { state },
            GameEvent::GameFinished { state, .. } => ServerMessage::GameFinished { state },
            GameEvent::ScoresUpdated { scores, .. } => ServerMessage::ScoresUpdated { scores },
            GameEvent::OpponentProgress {
                player_id,
                category_index,
                ..
            } => ServerMessage::OpponentProgress {
                player_id,
                category_index,
            },
        }
    }

    /// Event announcing a freshly persisted state for the given stage transition
    pub fn for_state(room: &Room) -> GameEvent {
        use game_types::Stage;

        let game_id = room.config.id.clone();
        let state = room.state.clone();
        match room.state.stage {
            Stage::Pre => GameEvent::RoundCancelled { game_id, state },
            Stage::Active => GameEvent::RoundStarted { game_id, state },
            Stage::Ending => GameEvent::RoundEnding { game_id, state },
            Stage::Review => GameEvent::RoundEnded { game_id, state },
            Stage::Finished => GameEvent::GameFinished { game_id, state },
        }
    }
}

/// Receives every published event, e.g. to fan it out to connected clients
#[async_trait]
pub trait GameEventHandler: Send + Sync {
    async fn handle_event(&self, event: &GameEvent);
}

/// Simple event bus for distributing game events
#[derive(Clone, Default)]
pub struct GameEventBus {
    handlers: Vec<Arc<dyn GameEventHandler>>,
}

impl GameEventBus {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn GameEventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn publish(&self, event: GameEvent) {
        for handler in &self.handlers {
            handler.handle_event(&event).await;
        }
    }
}
