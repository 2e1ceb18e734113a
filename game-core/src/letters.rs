use rand::Rng;
use rand::seq::IndexedRandom;

use crate::{EngineError, EngineResult};

/// Letters from `all_letters` that have not been played yet, upper-cased and de-duplicated
pub fn available_letters(all_letters: &[char], played_letters: &[char]) -> Vec<char> {
    let played: Vec<char> = played_letters
        .iter()
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let mut available: Vec<char> = Vec::with_capacity(all_letters.len());
    for letter in all_letters.iter().map(|c| c.to_ascii_uppercase()) {
        if !played.contains(&letter) && !available.contains(&letter) {
            available.push(letter);
        }
    }
    available
}

/// Pick the next round's letter uniformly from the unused part of the alphabet
pub fn next_letter<R: Rng + ?Sized>(
    game_id: &str,
    all_letters: &[char],
    played_letters: &[char],
    rng: &mut R,
) -> EngineResult<char> {
    available_letters(all_letters, played_letters)
        .choose(rng)
        .copied()
        .ok_or_else(|| EngineError::ExhaustedAlphabet {
            game_id: game_id.to_string(),
        })
}
