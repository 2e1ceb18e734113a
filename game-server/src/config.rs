use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::game_manager::GameManagerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("unknown store backend '{0}', expected 'memory' or 'sqlite'")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub session_ttl_seconds: u64,
    pub finalize_grace_ms: u64,
    pub connection_timeout_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub enable_debug_routes: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(name, default);
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: var_or("HOST", "127.0.0.1"),
            port: parse_var("PORT", "8080")?,
            store_backend: var_or("STORE_BACKEND", "memory").parse()?,
            database_url: var_or(
                "DATABASE_URL",
                game_persistence::connection::DEFAULT_DATABASE_URL,
            ),
            session_ttl_seconds: parse_var("SESSION_TTL_SECONDS", "3600")?,
            finalize_grace_ms: parse_var("FINALIZE_GRACE_MS", "1000")?,
            connection_timeout_seconds: parse_var("CONNECTION_TIMEOUT_SECONDS", "300")?,
            cleanup_interval_seconds: parse_var("CLEANUP_INTERVAL_SECONDS", "30")?,
            enable_debug_routes: parse_var("ENABLE_DEBUG_ROUTES", "false")?,
        })
    }

    pub fn game_manager_settings(&self) -> GameManagerSettings {
        GameManagerSettings {
            session_ttl: Duration::from_secs(self.session_ttl_seconds),
            finalize_grace: Duration::from_millis(self.finalize_grace_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            database_url: game_persistence::connection::DEFAULT_DATABASE_URL.to_string(),
            session_ttl_seconds: 3600,
            finalize_grace_ms: 1000,
            connection_timeout_seconds: 300,
            cleanup_interval_seconds: 30,
            enable_debug_routes: false,
        }
    }
}
