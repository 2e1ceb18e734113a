use crate::{Category, GameId, Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

/// One player's answers for a round, keyed by category
pub type AnswerSet = BTreeMap<Category, String>;
/// Every player's answers for a round
pub type Answers = BTreeMap<PlayerId, AnswerSet>;
/// One player's per-category scores for a round
pub type ScoreRow = BTreeMap<Category, i32>;
/// The score grid of a round
pub type Scores = BTreeMap<PlayerId, ScoreRow>;
/// Totals across every round of a finished game
pub type FinalScores = BTreeMap<PlayerId, i32>;

pub const DEFAULT_LETTERS: &str = "ABCDEFGHIJKLMNOPRSTUVWY";
pub const DEFAULT_NUM_ROUNDS: u32 = 5;
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "Boy's name",
    "Girl's name",
    "Animal",
    "Country",
    "Food",
    "Colour",
    "Band",
    "Film",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum GameMode {
    /// Round ends when a player shouts "stop the bus"
    Race,
    /// Round ends when the time limit runs out (or a player stops it early)
    Timer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameConfig {
    pub id: GameId,
    pub categories: Vec<Category>,
    pub num_rounds: u32,
    pub mode: GameMode,
    pub time_limit_ms: Option<u64>,
    /// Remaining usable alphabet; played letters are removed as rounds end
    pub letters: String,
    pub alliteration_scoring: bool,
    pub last_author: Option<PlayerId>,
}

impl GameConfig {
    pub fn default_for(id: impl Into<GameId>) -> Self {
        Self {
            id: id.into(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            num_rounds: DEFAULT_NUM_ROUNDS,
            mode: GameMode::Race,
            time_limit_ms: None,
            letters: DEFAULT_LETTERS.to_string(),
            alliteration_scoring: false,
            last_author: None,
        }
    }

    pub fn letter_pool(&self) -> Vec<char> {
        self.letters
            .chars()
            .filter(|c| c.is_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Stage {
    Pre,
    Active,
    Ending,
    Review,
    Finished,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pre => "PRE",
            Stage::Active => "ACTIVE",
            Stage::Ending => "ENDING",
            Stage::Review => "REVIEW",
            Stage::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Round {
    pub index: u32,
    pub letter: char,
    /// Category set frozen when the round started
    pub categories: Vec<Category>,
    pub time_started: i64, // epoch millis
    pub time_ended: Option<i64>,
    pub ended_by_player: Option<PlayerId>,
    pub answers: Answers,
    pub scores: Scores,
}

impl Round {
    pub fn score_total(&self, player_id: &str) -> i32 {
        self.scores
            .get(player_id)
            .map(|row| row.values().sum())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameState {
    pub stage: Stage,
    pub current_round: Option<Round>,
    pub previous_rounds: Vec<Round>,
    pub final_scores: Option<FinalScores>,
    pub next_game_id: Option<GameId>,
    /// Bumped on every persisted write
    #[serde(default)]
    pub version: u64,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            stage: Stage::Pre,
            current_round: None,
            previous_rounds: Vec::new(),
            final_scores: None,
            next_game_id: None,
            version: 0,
        }
    }

    /// Letters of every completed round plus the one in play
    pub fn played_letters(&self) -> Vec<char> {
        self.previous_rounds
            .iter()
            .chain(self.current_round.iter())
            .map(|round| round.letter)
            .collect()
    }

    pub fn rounds_played(&self) -> usize {
        self.previous_rounds.len()
    }

    pub fn current_letter(&self) -> Option<char> {
        self.current_round.as_ref().map(|round| round.letter)
    }

    pub fn is_round_in_progress(&self) -> bool {
        matches!(self.stage, Stage::Active | Stage::Ending)
    }

    /// Running totals over completed rounds and the round under review
    pub fn standings(&self) -> FinalScores {
        let mut totals = FinalScores::new();
        let reviewed = match self.stage {
            Stage::Review => self.current_round.as_ref(),
            _ => None,
        };
        for round in self.previous_rounds.iter().chain(reviewed) {
            for (player_id, row) in &round.scores {
                *totals.entry(player_id.clone()).or_insert(0) += row.values().sum::<i32>();
            }
        }
        totals
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a client needs to render a room after joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Room {
    pub config: GameConfig,
    pub players: Vec<Player>,
    pub state: GameState,
}
