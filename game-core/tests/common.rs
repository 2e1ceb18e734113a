#![allow(dead_code)]

use async_trait::async_trait;
use game_core::{GameEvent, GameEventHandler, RoundStateMachine};
use game_types::{AnswerSet, Answers, GameConfig, GameState, Player, Room, Round, Scores};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};

pub const ALICE: &str = "8c86d893-5c4b-4a3e-9f3c-2a5b8d7e1f01";
pub const BOB: &str = "06c245a4-2f1e-4d7b-8a3c-9e0f1b2c3d4e";

/// Creates a test player with a predictable id
pub fn create_test_player(name: &str) -> Player {
    Player::new(
        format!("test-player-{}", name.to_lowercase()),
        name,
        "#4363d8",
    )
}

/// Creates a room in the lobby with the given players and round quota
pub fn create_test_room(players: Vec<Player>, num_rounds: u32) -> Room {
    let mut config = GameConfig::default_for(uuid::Uuid::new_v4().to_string());
    config.categories = vec![
        "Animal".to_string(),
        "Country".to_string(),
        "Food".to_string(),
    ];
    config.num_rounds = num_rounds;
    Room {
        config,
        players,
        state: GameState::new(),
    }
}

/// Creates a standard test room with 2 players and 3 rounds
pub fn create_standard_room() -> Room {
    create_test_room(
        vec![create_test_player("Alice"), create_test_player("Bob")],
        3,
    )
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn answer_set(pairs: &[(&str, &str)]) -> AnswerSet {
    pairs
        .iter()
        .map(|(c, a)| (c.to_string(), a.to_string()))
        .collect()
}

/// Runs one full round: start, stop, score with answers built from the letter
pub fn play_round(
    room: &mut Room,
    rng: &mut StdRng,
    answers_for: impl Fn(char) -> Answers,
) -> char {
    RoundStateMachine::start_round(room, 0, rng).expect("round should start");
    let letter = room.state.current_letter().expect("round has a letter");
    let index = RoundStateMachine::end_round(room, None, 1).expect("round should end");
    RoundStateMachine::finalize_round(room, index, answers_for(letter))
        .expect("round should finalize");
    letter
}

fn scored_round(index: u32, letter: char, alice: [i32; 2], bob: [i32; 2]) -> Round {
    let row = |values: [i32; 2]| {
        [("Animal", values[0]), ("Food", values[1])]
            .iter()
            .map(|(c, s)| (c.to_string(), *s))
            .collect()
    };
    let scores: Scores = [(ALICE.to_string(), row(alice)), (BOB.to_string(), row(bob))]
        .into_iter()
        .collect();
    Round {
        index,
        letter,
        categories: vec!["Animal".to_string(), "Food".to_string()],
        time_started: 0,
        time_ended: Some(1),
        ended_by_player: Some(ALICE.to_string()),
        answers: Answers::new(),
        scores,
    }
}

/// Three reviewed rounds totalling 7 for Alice and 4 for Bob
pub fn fixture_rounds() -> Vec<Round> {
    vec![
        scored_round(0, 'A', [1, 2], [1, 0]),
        scored_round(1, 'B', [1, 1], [0, 1]),
        scored_round(2, 'C', [0, 2], [1, 1]),
    ]
}

/// Event collector for testing event emissions
#[derive(Clone)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<GameEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_events(&self) -> Vec<GameEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn has_event_type(&self, check_fn: impl Fn(&GameEvent) -> bool) -> bool {
        self.events.lock().unwrap().iter().any(check_fn)
    }
}

#[async_trait]
impl GameEventHandler for EventCollector {
    async fn handle_event(&self, event: &GameEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
