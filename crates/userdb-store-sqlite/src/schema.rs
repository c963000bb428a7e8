//! SQL schema for the SQLite document store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    doc_id     TEXT NOT NULL,   -- 24-character hex ObjectId
    body       BLOB NOT NULL,   -- BSON-encoded document, _id included
    PRIMARY KEY (collection, doc_id)
);

PRAGMA user_version = 1;
";
