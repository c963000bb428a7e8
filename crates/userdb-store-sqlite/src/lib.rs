//! SQLite backend for the user database.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Documents are stored BSON-encoded, one
//! row per document, partitioned by collection name.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteCollection, SqliteStore};
