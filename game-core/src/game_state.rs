use game_types::{
    AnswerSet, Answers, GameId, GameMode, GameSettings, PlayerId, Room, Round, Scores, Stage,
};
use rand::Rng;
use std::fmt;
use tracing::{debug, info};

use crate::identity::new_game_id;
use crate::letters::next_letter;
use crate::scoring::{ScoringEngine, Validation};
use crate::{EngineError, EngineResult};

pub const MAX_ROUNDS: u32 = 26;
pub const MAX_CATEGORIES: usize = 20;
pub const MIN_TIME_LIMIT_MS: u64 = 5_000;

/// Commands that move a room through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    StartRound,
    CancelStart,
    EndRound,
    FinalizeRound,
    SubmitAnswer,
    VoteOverride,
    UpdateConfig,
    EndGame,
}

impl Action {
    /// The guard table: stages in which each action is accepted
    pub fn allowed_stages(&self) -> &'static [Stage] {
        match self {
            Action::StartRound => &[Stage::Pre, Stage::Review],
            Action::CancelStart => &[Stage::Active],
            Action::EndRound => &[Stage::Active],
            Action::FinalizeRound => &[Stage::Ending],
            Action::SubmitAnswer => &[Stage::Active, Stage::Ending],
            Action::VoteOverride => &[Stage::Review],
            Action::UpdateConfig => &[Stage::Pre, Stage::Review],
            Action::EndGame => &[Stage::Active, Stage::Review],
        }
    }

    pub fn is_allowed(&self, stage: Stage) -> bool {
        self.allowed_stages().contains(&stage)
    }

    pub fn check(&self, stage: Stage) -> EngineResult<()> {
        if self.is_allowed(stage) {
            Ok(())
        } else {
            Err(EngineError::IllegalTransition {
                action: *self,
                stage,
            })
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::StartRound => "start a round",
            Action::CancelStart => "cancel the round start",
            Action::EndRound => "end the round",
            Action::FinalizeRound => "finalize the round",
            Action::SubmitAnswer => "submit answers",
            Action::VoteOverride => "vote on an answer",
            Action::UpdateConfig => "change the settings",
            Action::EndGame => "end the game",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    RoundStarted { index: u32, letter: char },
    /// The round quota was already met, so the game finished instead
    GameFinished,
}

/// Pure transitions over a [`Room`] value. Callers are responsible for loading,
/// locking and persisting the room around each call; on error the room is left
/// untouched.
pub struct RoundStateMachine;

impl RoundStateMachine {
    pub fn start_round<R: Rng + ?Sized>(
        room: &mut Room,
        now_ms: i64,
        rng: &mut R,
    ) -> EngineResult<StartOutcome> {
        Action::StartRound.check(room.state.stage)?;

        let outgoing = usize::from(room.state.stage == Stage::Review && room.state.current_round.is_some());
        let completed = room.state.previous_rounds.len() + outgoing;

        if completed >= room.config.num_rounds as usize {
            info!(
                "Game {} played all {} rounds, finishing",
                room.config.id, room.config.num_rounds
            );
            Self::finish(room, new_game_id(rng));
            return Ok(StartOutcome::GameFinished);
        }

        // Pick the letter before touching the room so exhaustion leaves it unchanged
        let letter = next_letter(
            &room.config.id,
            &room.config.letter_pool(),
            &room.state.played_letters(),
            rng,
        )?;

        if let Some(round) = room.state.current_round.take() {
            room.state.previous_rounds.push(round);
        }

        let categories = room.config.categories.clone();
        let player_ids: Vec<PlayerId> = room.players.iter().map(|p| p.id.clone()).collect();
        let index = room.state.previous_rounds.len() as u32;

        room.state.current_round = Some(Round {
            index,
            letter,
            answers: player_ids
                .iter()
                .map(|id| (id.clone(), AnswerSet::new()))
                .collect(),
            scores: ScoringEngine::empty_scores(&categories, &player_ids),
            categories,
            time_started: now_ms,
            time_ended: None,
            ended_by_player: None,
        });
        room.state.stage = Stage::Active;

        info!(
            "Game {} started round {} with letter {}",
            room.config.id, index, letter
        );
        Ok(StartOutcome::RoundStarted { index, letter })
    }

    /// Abort a round nobody has answered yet and return to the lobby
    pub fn cancel_start(room: &mut Room, answers_submitted: bool) -> EngineResult<Round> {
        Action::CancelStart.check(room.state.stage)?;
        if answers_submitted {
            return Err(EngineError::validation(
                "answers have already been submitted this round",
            ));
        }

        let round = room
            .state
            .current_round
            .take()
            .ok_or_else(|| EngineError::not_found("round", &room.config.id))?;
        room.state.stage = Stage::Pre;

        info!(
            "Game {} cancelled round {} (letter {})",
            room.config.id, round.index, round.letter
        );
        Ok(round)
    }

    /// Mark the round as ending; returns the index the deferred finalize must target
    pub fn end_round(room: &mut Room, ended_by: Option<&str>, now_ms: i64) -> EngineResult<u32> {
        Action::EndRound.check(room.state.stage)?;

        let round = room
            .state
            .current_round
            .as_mut()
            .ok_or_else(|| EngineError::not_found("round", &room.config.id))?;
        round.time_ended = Some(now_ms);
        round.ended_by_player = ended_by.map(str::to_string);
        let index = round.index;
        room.state.stage = Stage::Ending;

        info!(
            "Game {} round {} ending (stopped by {:?})",
            room.config.id, index, ended_by
        );
        Ok(index)
    }

    /// Score the collected answers and move the room to review.
    ///
    /// Fails when the room is no longer ending round `round_index`, which lets a
    /// late or duplicated finalize job detect that it has nothing to do.
    pub fn finalize_round(room: &mut Room, round_index: u32, collected: Answers) -> EngineResult<()> {
        Action::FinalizeRound.check(room.state.stage)?;

        let alliteration = room.config.alliteration_scoring;
        let stage = room.state.stage;
        let mut player_ids: Vec<PlayerId> = room.players.iter().map(|p| p.id.clone()).collect();

        let round = room
            .state
            .current_round
            .as_mut()
            .filter(|round| round.index == round_index)
            .ok_or(EngineError::IllegalTransition {
                action: Action::FinalizeRound,
                stage,
            })?;

        // Players who left mid-round still get scored
        for player_id in round.answers.keys().chain(collected.keys()) {
            if !player_ids.contains(player_id) {
                player_ids.push(player_id.clone());
            }
        }

        let answers: Answers = player_ids
            .iter()
            .map(|player_id| {
                let set: AnswerSet = collected
                    .get(player_id)
                    .map(|set| {
                        set.iter()
                            .filter(|(category, _)| round.categories.contains(category))
                            .map(|(category, answer)| (category.clone(), answer.trim().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                (player_id.clone(), set)
            })
            .collect();

        round.scores = ScoringEngine::initial_scores(
            &answers,
            round.letter,
            &round.categories,
            &player_ids,
            alliteration,
        );
        round.answers = answers;
        let letter = round.letter;

        // Round-end letter exclusion
        room.config
            .letters
            .retain(|c| !c.eq_ignore_ascii_case(&letter));
        room.state.stage = Stage::Review;

        info!(
            "Game {} round {} scored for {} players",
            room.config.id,
            round_index,
            player_ids.len()
        );
        Ok(())
    }

    /// Apply a review vote to one cell and return the updated grid
    pub fn vote(
        room: &mut Room,
        player_id: &str,
        category: &str,
        accepted: bool,
    ) -> EngineResult<Scores> {
        Action::VoteOverride.check(room.state.stage)?;
        let alliteration = room.config.alliteration_scoring;

        let round = room
            .state
            .current_round
            .as_mut()
            .ok_or_else(|| EngineError::not_found("round", &room.config.id))?;

        if !round.categories.iter().any(|c| c == category) {
            return Err(EngineError::validation(format!(
                "unknown category '{}'",
                category
            )));
        }
        let row = round
            .scores
            .get_mut(player_id)
            .ok_or_else(|| EngineError::not_found("player", player_id))?;

        let score = if accepted {
            let answer = round
                .answers
                .get(player_id)
                .and_then(|set| set.get(category))
                .map(String::as_str);
            ScoringEngine::score_answer(alliteration, round.letter, answer, Validation::Lenient)
        } else {
            0
        };
        row.insert(category.to_string(), score);

        debug!(
            "Game {} vote on {}/{}: accepted={} -> {}",
            room.config.id, player_id, category, accepted, score
        );
        Ok(round.scores.clone())
    }

    /// Finish the game early. A round under review is kept; an unscored one is discarded.
    pub fn end_game(room: &mut Room, next_game_id: GameId) -> EngineResult<()> {
        Action::EndGame.check(room.state.stage)?;
        Self::finish(room, next_game_id);
        Ok(())
    }

    fn finish(room: &mut Room, next_game_id: GameId) {
        if let Some(round) = room.state.current_round.take() {
            if room.state.stage == Stage::Review {
                room.state.previous_rounds.push(round);
            } else {
                debug!(
                    "Game {} discarding unscored round {}",
                    room.config.id, round.index
                );
            }
        }

        room.state.final_scores = Some(ScoringEngine::final_scores(&room.state.previous_rounds));
        room.state.next_game_id = Some(next_game_id);
        room.state.stage = Stage::Finished;

        info!(
            "Game {} finished after {} rounds",
            room.config.id,
            room.state.previous_rounds.len()
        );
    }

    pub fn update_settings(
        room: &mut Room,
        settings: GameSettings,
        author: &str,
    ) -> EngineResult<()> {
        Action::UpdateConfig.check(room.state.stage)?;
        Self::validate_settings(&settings)?;

        let in_review = usize::from(room.state.stage == Stage::Review);
        let committed = room.state.previous_rounds.len() + in_review;
        if (settings.num_rounds as usize) < committed {
            return Err(EngineError::validation(format!(
                "{} rounds have already been played",
                committed
            )));
        }

        let config = &mut room.config;
        config.categories = settings
            .categories
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        config.num_rounds = settings.num_rounds;
        config.mode = settings.mode;
        config.time_limit_ms = settings.time_limit_ms;
        config.letters = settings
            .letters
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        config.alliteration_scoring = settings.alliteration_scoring;
        config.last_author = Some(author.to_string());
        Ok(())
    }

    pub fn validate_settings(settings: &GameSettings) -> EngineResult<()> {
        if settings.categories.is_empty() || settings.categories.len() > MAX_CATEGORIES {
            return Err(EngineError::validation(format!(
                "between 1 and {} categories are required",
                MAX_CATEGORIES
            )));
        }
        let mut seen: Vec<String> = Vec::new();
        for category in &settings.categories {
            let normalized = category.trim().to_lowercase();
            if normalized.is_empty() {
                return Err(EngineError::validation("category names must not be empty"));
            }
            if seen.contains(&normalized) {
                return Err(EngineError::validation(format!(
                    "duplicate category '{}'",
                    category.trim()
                )));
            }
            seen.push(normalized);
        }
        if settings.num_rounds == 0 || settings.num_rounds > MAX_ROUNDS {
            return Err(EngineError::validation(format!(
                "number of rounds must be between 1 and {}",
                MAX_ROUNDS
            )));
        }
        if !settings.letters.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(EngineError::validation("at least one letter is required"));
        }
        if settings.mode == GameMode::Timer {
            match settings.time_limit_ms {
                Some(limit) if limit >= MIN_TIME_LIMIT_MS => {}
                _ => {
                    return Err(EngineError::validation(format!(
                        "timer games need a time limit of at least {} ms",
                        MIN_TIME_LIMIT_MS
                    )));
                }
            }
        }
        Ok(())
    }
}
