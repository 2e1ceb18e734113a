pub mod answers;
pub mod error;
pub mod game_events;
pub mod game_state;
pub mod identity;
pub mod letters;
pub mod repository;
pub mod scoring;
pub mod session_store;

// Re-export main components
pub use answers::*;
pub use error::*;
pub use game_events::*;
pub use game_state::*;
pub use identity::*;
pub use letters::*;
pub use repository::*;
pub use scoring::*;
pub use session_store::*;
