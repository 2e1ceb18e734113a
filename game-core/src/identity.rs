use game_types::{GameId, Player};
use rand::Rng;
use rand::seq::IndexedRandom;
use uuid::Uuid;

use crate::{EngineError, EngineResult};

pub const MAX_NICKNAME_LEN: usize = 24;
pub const MAX_GAME_ID_LEN: usize = 48;

const ADJECTIVES: [&str; 16] = [
    "Brisk", "Cheery", "Dapper", "Eager", "Fuzzy", "Gentle", "Hasty", "Jolly", "Lucky", "Mellow",
    "Nimble", "Plucky", "Quiet", "Rowdy", "Sunny", "Witty",
];

const ANIMALS: [&str; 16] = [
    "Badger", "Bison", "Crane", "Ferret", "Gecko", "Heron", "Koala", "Lemur", "Marmot", "Newt",
    "Otter", "Panda", "Puffin", "Stoat", "Toucan", "Walrus",
];

pub const COLOURS: [&str; 10] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe",
];

/// Fresh player with a random display name and colour
pub fn random_player<R: Rng + ?Sized>(rng: &mut R) -> Player {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Brisk");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("Otter");
    let colour = COLOURS.choose(rng).copied().unwrap_or(COLOURS[0]);

    Player::new(
        Uuid::new_v4().to_string(),
        format!("{} {}", adjective, animal),
        colour,
    )
}

/// Human-readable room id such as `jolly-puffin-42`
pub fn new_game_id<R: Rng + ?Sized>(rng: &mut R) -> GameId {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Brisk");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("Otter");
    let number: u16 = rng.random_range(10..100);
    format!(
        "{}-{}-{}",
        adjective.to_lowercase(),
        animal.to_lowercase(),
        number
    )
}

pub fn validate_nickname(name: &str) -> EngineResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("nickname must not be empty"));
    }
    if name.chars().count() > MAX_NICKNAME_LEN {
        return Err(EngineError::validation(format!(
            "nickname must be at most {} characters",
            MAX_NICKNAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub fn validate_game_id(game_id: &str) -> EngineResult<()> {
    if game_id.is_empty() {
        return Err(EngineError::validation("game id is required"));
    }
    if game_id.len() > MAX_GAME_ID_LEN
        || !game_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EngineError::validation(format!(
            "malformed game id '{}'",
            game_id
        )));
    }
    Ok(())
}
