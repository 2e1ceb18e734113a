pub mod session_entries;

pub mod prelude {
    pub use super::session_entries::Entity as SessionEntries;
}
