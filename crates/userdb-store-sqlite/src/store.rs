//! [`SqliteStore`] and [`SqliteCollection`], the SQLite implementation of
//! [`DocumentStore`].

use std::{path::Path, sync::Arc};

use bson::{Bson, Document, oid::ObjectId};
use rusqlite::OptionalExtension as _;

use userdb_core::store::DocumentStore;

use crate::{
  Error, Result,
  encode::{decode_document, document_id, encode_document, encode_id},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A document database backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// A handle on one named collection. Collections need no creation step.
  pub fn collection(&self, name: impl Into<String>) -> SqliteCollection {
    SqliteCollection {
      conn: self.conn.clone(),
      name: Arc::from(name.into()),
    }
  }
}

// ─── Collection ──────────────────────────────────────────────────────────────

/// One collection of a [`SqliteStore`].
#[derive(Clone)]
pub struct SqliteCollection {
  conn: tokio_rusqlite::Connection,
  name: Arc<str>,
}

impl SqliteCollection {
  pub fn name(&self) -> &str { &self.name }

  /// Every document in the collection, in insertion order.
  pub async fn all_documents(&self) -> Result<Vec<Document>> {
    let collection = self.name.to_string();
    let bodies: Vec<Vec<u8>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT body FROM documents WHERE collection = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![collection], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<Vec<u8>>>>()?;
        Ok(rows)
      })
      .await?;

    bodies.iter().map(|b| decode_document(b)).collect()
  }

  fn not_found(&self, id: ObjectId) -> Error {
    Error::DocumentNotFound {
      collection: self.name.to_string(),
      id,
    }
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteCollection {
  type Error = Error;

  async fn get_document_by_id(&self, id: ObjectId) -> Result<Option<Document>> {
    let collection = self.name.to_string();
    let id_str = encode_id(id);

    let body: Option<Vec<u8>> = self
      .conn
      .call(move |conn| {
        let body = conn
          .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![collection, id_str],
            |r| r.get(0),
          )
          .optional()?;
        Ok(body)
      })
      .await?;

    body.as_deref().map(decode_document).transpose()
  }

  async fn get_documents_by_attribute(
    &self,
    name: &str,
    value: Bson,
  ) -> Result<Vec<Document>> {
    // Bodies are opaque to SQLite, so matching happens after decoding.
    let docs = self.all_documents().await?;
    Ok(
      docs
        .into_iter()
        .filter(|doc| doc.get(name) == Some(&value))
        .collect(),
    )
  }

  async fn insert(&self, doc: Document) -> Result<ObjectId> {
    let id = document_id(&doc)?;
    let body = encode_document(&doc)?;
    let collection = self.name.to_string();
    let id_str = encode_id(id);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO documents (collection, doc_id, body)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![collection, id_str, body],
        )?;
        Ok(n)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateDocument {
        collection: self.name.to_string(),
        id,
      });
    }
    tracing::debug!(collection = %self.name, %id, "document inserted");
    Ok(id)
  }

  async fn update(&self, doc: Document) -> Result<()> {
    let id = document_id(&doc)?;
    let body = encode_document(&doc)?;
    let collection = self.name.to_string();
    let id_str = encode_id(id);

    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE documents SET body = ?3 WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![collection, id_str, body],
        )?;
        Ok(n)
      })
      .await?;

    if updated == 0 {
      return Err(self.not_found(id));
    }
    tracing::debug!(collection = %self.name, %id, "document replaced");
    Ok(())
  }

  async fn remove(&self, id: ObjectId) -> Result<bool> {
    let collection = self.name.to_string();
    let id_str = encode_id(id);

    let removed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![collection, id_str],
        )?;
        Ok(n)
      })
      .await?;

    Ok(removed > 0)
  }
}
