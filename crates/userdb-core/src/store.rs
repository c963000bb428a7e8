//! The `DocumentStore` trait, the persistence collaborator.
//!
//! The trait is implemented by storage backends (e.g. `userdb-store-sqlite`).
//! One store value addresses one collection. The repositories in
//! [`crate::db`] depend on this abstraction, not on any concrete backend.

use std::future::Future;

use bson::{Bson, Document, oid::ObjectId};

/// Key-based access to one collection of documents, each identified by an
/// `_id` of type [`ObjectId`].
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Retrieve a document by `_id`. Returns `None` if not found.
  fn get_document_by_id(
    &self,
    id: ObjectId,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  /// All documents whose top-level field `name` equals `value`.
  fn get_documents_by_attribute<'a>(
    &'a self,
    name: &'a str,
    value: Bson,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Persist a new document. It must carry an `_id`; storing a second
  /// document with the same `_id` is an error.
  fn insert(
    &self,
    doc: Document,
  ) -> impl Future<Output = Result<ObjectId, Self::Error>> + Send + '_;

  /// Replace the stored document with the same `_id`. Errors if no such
  /// document exists.
  fn update(
    &self,
    doc: Document,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete a document. Returns `false` if it did not exist.
  fn remove(
    &self,
    id: ObjectId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
