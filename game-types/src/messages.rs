use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    AnswerSet, Category, ErrorKind, GameConfig, GameId, GameMode, GameState, Player, PlayerId,
    Room, Scores,
};

/// Editable part of a room's configuration, as sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameSettings {
    pub categories: Vec<Category>,
    pub num_rounds: u32,
    pub mode: GameMode,
    pub time_limit_ms: Option<u64>,
    pub letters: String,
    pub alliteration_scoring: bool,
}

impl From<&GameConfig> for GameSettings {
    fn from(config: &GameConfig) -> Self {
        GameSettings {
            categories: config.categories.clone(),
            num_rounds: config.num_rounds,
            mode: config.mode,
            time_limit_ms: config.time_limit_ms,
            letters: config.letters.clone(),
            alliteration_scoring: config.alliteration_scoring,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    /// First message on a connection; omit the id to be issued a new player
    Identify { player_id: Option<PlayerId> },
    CreateGame { settings: Option<GameSettings> },
    JoinGame { game_id: GameId },
    UpdateConfig { settings: GameSettings },
    UpdateNickname { name: String },
    StartRound,
    CancelStart,
    SubmitAnswer {
        answers: AnswerSet,
        category_index: Option<u32>,
    },
    RetrieveAnswers,
    EndRound,
    VoteAnswer {
        player_id: PlayerId,
        category: Category,
        accepted: bool,
    },
    EndGame,
    JoinNextGame,
    LeaveGame,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    Identified { player: Player },
    JoinedGame { room: Room },
    PlayerJoined { players: Vec<Player> },
    PlayerLeft { players: Vec<Player> },
    PlayerRenamed { players: Vec<Player> },
    ConfigChanged { config: GameConfig },
    RoundStarted { state: GameState },
    RoundCancelled { state: GameState },
    RoundEnding { state: GameState },
    RoundEnded { state: GameState },
    GameFinished { state: GameState },
    ScoresUpdated { scores: Scores },
    OpponentProgress { player_id: PlayerId, category_index: u32 },
    AnswersRetrieved { answers: Option<AnswerSet> },
    GameLeft,
    Error { kind: ErrorKind, message: String },
}
