use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Error categories reported to clients alongside a human-readable message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ErrorKind {
    /// Room or player expired or never existed
    NotFound,
    /// Command not allowed in the room's current stage
    IllegalTransition,
    /// Malformed or missing input, rejected before any mutation
    ValidationFailure,
    /// Lost a race on the room record; retry the whole command
    Conflict,
    /// Every configured letter has been played
    ExhaustedAlphabet,
    /// Backing store unavailable or returned garbage
    StoreUnavailable,
    /// Message could not be parsed or the connection is not set up yet
    BadRequest,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::StoreUnavailable)
    }
}
