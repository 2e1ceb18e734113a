pub mod errors;
pub mod game;
pub mod messages;
pub mod user;

/// Human-readable room identifier, e.g. `brisk-otter-42`.
pub type GameId = String;
/// Opaque player identifier issued on first contact.
pub type PlayerId = String;
pub type Category = String;

// Re-export all types
pub use errors::*;
pub use game::*;
pub use messages::*;
pub use user::*;
