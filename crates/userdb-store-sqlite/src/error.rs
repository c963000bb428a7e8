//! Error type for `userdb-store-sqlite`.

use bson::oid::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("bson encode error: {0}")]
  Encode(#[from] bson::ser::Error),

  #[error("bson decode error: {0}")]
  Decode(#[from] bson::de::Error),

  /// The document has no `_id`, or its `_id` is not an object id.
  #[error("document has no usable _id")]
  MissingId,

  #[error("document {id} not found in {collection}")]
  DocumentNotFound { collection: String, id: ObjectId },

  #[error("document {id} already exists in {collection}")]
  DuplicateDocument { collection: String, id: ObjectId },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
