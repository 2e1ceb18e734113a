pub mod connection;
pub mod entities;
pub mod session_store;

pub use session_store::SqlSessionStore;
