//! Encoding helpers between BSON documents and the column values stored in
//! SQLite.
//!
//! Object ids are stored as lowercase 24-character hex strings. Bodies are
//! the raw BSON bytes of the whole document.

use bson::{Bson, Document, oid::ObjectId};

use crate::{Error, Result};

pub fn encode_id(id: ObjectId) -> String { id.to_hex() }

/// The `_id` of a document about to be written.
pub fn document_id(doc: &Document) -> Result<ObjectId> {
  match doc.get("_id") {
    Some(Bson::ObjectId(id)) => Ok(*id),
    _ => Err(Error::MissingId),
  }
}

pub fn encode_document(doc: &Document) -> Result<Vec<u8>> {
  Ok(bson::to_vec(doc)?)
}

pub fn decode_document(body: &[u8]) -> Result<Document> {
  Ok(bson::from_slice(body)?)
}

#[cfg(test)]
mod tests {
  use bson::doc;

  use super::*;

  #[test]
  fn id_must_be_object_id() {
    assert!(matches!(
      document_id(&doc! { "_id": "not-an-oid" }),
      Err(Error::MissingId)
    ));
    assert!(matches!(document_id(&doc! {}), Err(Error::MissingId)));

    let id = ObjectId::new();
    assert_eq!(document_id(&doc! { "_id": id }).unwrap(), id);
    assert_eq!(encode_id(id).len(), 24);
  }

  #[test]
  fn body_keeps_nested_values() {
    let d = doc! {
      "_id": ObjectId::new(),
      "params": { "version": "1" },
      "sent_ts": null,
    };
    let back = decode_document(&encode_document(&d).unwrap()).unwrap();
    assert_eq!(back, d);
  }
}
