use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub colour: String,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, colour: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            colour: colour.into(),
        }
    }
}
