use game_types::{ErrorKind, Stage};
use thiserror::Error;

use crate::Action;

/// Errors produced by the room engine. All of them are recoverable by the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot {action} while the game is {stage}")]
    IllegalTransition { action: Action, stage: Stage },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("game '{game_id}' was modified concurrently, retry")]
    Conflict { game_id: String },

    #[error("no unused letters remain for game '{game_id}'")]
    ExhaustedAlphabet { game_id: String },

    #[error("session store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            EngineError::Validation(_) => ErrorKind::ValidationFailure,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::ExhaustedAlphabet { .. } => ErrorKind::ExhaustedAlphabet,
            EngineError::Store(_) => ErrorKind::StoreUnavailable,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(format!("corrupt record: {}", err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
