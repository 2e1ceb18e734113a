use game_types::{Answers, Category, FinalScores, PlayerId, Round, ScoreRow, Scores};

/// How strictly an answer is checked against the round letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Automatic scoring: the answer must start with the letter
    Strict,
    /// A human vote accepted the answer, so the letter check is relaxed
    Lenient,
}

pub struct ScoringEngine;

impl ScoringEngine {
    /// Score a single answer for the given round letter.
    ///
    /// Answers that do not start with the letter, or consist of nothing but the
    /// letter, score 0 under strict validation. With alliteration scoring the
    /// score is the number of words starting with the letter, otherwise a valid
    /// answer is worth 1.
    pub fn score_answer(
        alliteration: bool,
        letter: char,
        answer: Option<&str>,
        validation: Validation,
    ) -> i32 {
        let answer = match answer.map(str::trim) {
            Some(answer) if !answer.is_empty() => answer.to_lowercase(),
            _ => return 0,
        };
        let letter: String = letter.to_lowercase().collect();

        let words: Vec<&str> = answer.split_whitespace().collect();
        let starts_with_letter = answer.starts_with(&letter);
        let is_bare_letter = answer == letter;
        let looks_invalid = !starts_with_letter || is_bare_letter;

        let alliterative_words = words.iter().filter(|w| w.starts_with(&letter)).count() as i32;

        if validation == Validation::Lenient && looks_invalid {
            return if alliteration { alliterative_words } else { 1 };
        }

        if looks_invalid {
            0
        } else if alliteration {
            alliterative_words
        } else {
            1
        }
    }

    /// Automatic starting grid for a finished round: every player gets a row
    /// with one strictly scored cell per frozen category.
    pub fn initial_scores(
        answers: &Answers,
        letter: char,
        categories: &[Category],
        players: &[PlayerId],
        alliteration: bool,
    ) -> Scores {
        players
            .iter()
            .map(|player_id| {
                let player_answers = answers.get(player_id);
                let row: ScoreRow = categories
                    .iter()
                    .map(|category| {
                        let answer = player_answers
                            .and_then(|set| set.get(category))
                            .map(|a| a.to_lowercase())
                            .unwrap_or_default();
                        let score = Self::score_answer(
                            alliteration,
                            letter,
                            Some(&answer),
                            Validation::Strict,
                        );
                        (category.clone(), score)
                    })
                    .collect();
                (player_id.clone(), row)
            })
            .collect()
    }

    /// Zeroed grid used when a round starts
    pub fn empty_scores(categories: &[Category], players: &[PlayerId]) -> Scores {
        players
            .iter()
            .map(|player_id| {
                let row = categories.iter().map(|c| (c.clone(), 0)).collect();
                (player_id.clone(), row)
            })
            .collect()
    }

    /// Sum every player's category scores across rounds. A player missing from
    /// a round's grid contributes nothing for that round.
    pub fn final_scores(rounds: &[Round]) -> FinalScores {
        let mut totals = FinalScores::new();
        for round in rounds {
            for (player_id, row) in &round.scores {
                let round_total: i32 = row.values().sum();
                *totals.entry(player_id.clone()).or_insert(0) += round_total;
            }
        }
        totals
    }
}
