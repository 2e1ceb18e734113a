use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::{EngineError, EngineResult};

/// Default sliding lifetime of room and player records
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Logical record keys, independent of the backend
pub mod keys {
    pub const GAME_STATE_PREFIX: &str = "gameState:";
    pub const ANSWERS_PREFIX: &str = "answers:";

    pub fn player(player_id: &str) -> String {
        format!("player:{}", player_id)
    }

    pub fn game_config(game_id: &str) -> String {
        format!("gameConfig:{}", game_id)
    }

    pub fn game_players(game_id: &str) -> String {
        format!("gamePlayers:{}", game_id)
    }

    pub fn game_state(game_id: &str) -> String {
        format!("{}{}", GAME_STATE_PREFIX, game_id)
    }

    pub fn answers(game_id: &str, player_id: &str) -> String {
        format!("{}{}", answers_prefix(game_id), player_id)
    }

    pub fn answers_prefix(game_id: &str) -> String {
        format!("{}{}:", ANSWERS_PREFIX, game_id)
    }

    pub fn next_game(game_id: &str) -> String {
        format!("nextGame:{}", game_id)
    }

    pub fn previous_game(game_id: &str) -> String {
        format!("previousGame:{}", game_id)
    }
}

/// Keyed string storage with optional expiry. Every write replaces the value and
/// resets its lifetime, which makes the TTL sliding for records that are
/// rewritten on each transition.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> EngineResult<Option<String>>;

    /// `ttl = None` stores the value until it is deleted or flushed
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> EngineResult<()>;

    /// Returns whether a live value was removed
    async fn del(&self, key: &str) -> EngineResult<bool>;

    /// Live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> EngineResult<Vec<String>>;

    async fn flush(&self) -> EngineResult<()>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> EngineResult<usize>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store, used for single-node deployments and tests
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    offline: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away; every call fails until it is brought back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> T,
    ) -> EngineResult<T> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(EngineError::Store("memory store is offline".to_string()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Store("memory store lock poisoned".to_string()))?;
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        let now = Instant::now();
        self.with_entries(|entries| {
            entries
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value.clone())
        })
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> EngineResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.with_entries(|entries| {
            entries.insert(key.to_string(), Entry { value, expires_at });
        })
    }

    async fn del(&self, key: &str) -> EngineResult<bool> {
        let now = Instant::now();
        self.with_entries(|entries| {
            entries
                .remove(key)
                .is_some_and(|entry| entry.is_live(now))
        })
    }

    async fn keys(&self, prefix: &str) -> EngineResult<Vec<String>> {
        let now = Instant::now();
        self.with_entries(|entries| {
            let mut keys: Vec<String> = entries
                .iter()
                .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.sort();
            keys
        })
    }

    async fn flush(&self) -> EngineResult<()> {
        self.with_entries(|entries| entries.clear())
    }

    async fn purge_expired(&self) -> EngineResult<usize> {
        let now = Instant::now();
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now));
            before - entries.len()
        })
    }
}
