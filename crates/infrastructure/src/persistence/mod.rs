//! Persistence module
//!
//! SQLite-based storage for ban records.

pub mod connection;
pub mod migrations;
pub mod sqlite_ban_sink;

pub use connection::{ConnectionPool, DatabaseError, create_pool};
pub use sqlite_ban_sink::SqliteBanSink;
