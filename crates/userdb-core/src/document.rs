//! Field-level access to raw store documents.
//!
//! Every typed record is built by popping its recognised fields out of a
//! [`Fields`] reader, layer by layer. Whatever is left once all layers have
//! taken their share is either rejected or carried through untouched,
//! depending on the caller's [`UnknownFieldPolicy`].

use bson::{Bson, Document, oid::ObjectId};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// What to do with document fields that no layer of a record recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFieldPolicy {
  /// Fail construction with [`Error::UnknownField`].
  #[default]
  Reject,
  /// Keep the leftovers and write them back out unchanged.
  Passthrough,
}

// ─── Timestamp ───────────────────────────────────────────────────────────────

/// A timestamp as supplied by a caller or read from a stored document.
///
/// Documents encode [`Timestamp::Now`] as the boolean `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timestamp {
  Explicit(DateTime<Utc>),
  /// Resolved to the current time when the record is built.
  Now,
  #[default]
  Unset,
}

impl Timestamp {
  pub fn resolve(self) -> Option<DateTime<Utc>> {
    match self {
      Self::Explicit(ts) => Some(ts),
      Self::Now => Some(now()),
      Self::Unset => None,
    }
  }

  /// The document encoding of this input, before resolution.
  pub fn to_bson(self) -> Bson {
    match self {
      Self::Explicit(ts) => datetime_to_bson(ts),
      Self::Now => Bson::Boolean(true),
      Self::Unset => Bson::Null,
    }
  }
}

impl From<DateTime<Utc>> for Timestamp {
  fn from(ts: DateTime<Utc>) -> Self { Self::Explicit(ts) }
}

impl From<Option<DateTime<Utc>>> for Timestamp {
  fn from(ts: Option<DateTime<Utc>>) -> Self {
    ts.map_or(Self::Unset, Self::Explicit)
  }
}

/// The current time, truncated to the millisecond precision the store keeps.
pub fn now() -> DateTime<Utc> { bson::DateTime::now().to_chrono() }

pub(crate) fn datetime_to_bson(ts: DateTime<Utc>) -> Bson {
  Bson::DateTime(bson::DateTime::from_chrono(ts))
}

pub(crate) fn optional_to_bson<T: Into<Bson>>(value: Option<T>) -> Bson {
  value.map_or(Bson::Null, Into::into)
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// An owned snapshot of an input document that record constructors consume
/// field by field.
///
/// `Null` values are treated the same as absent fields.
#[derive(Debug)]
pub struct Fields {
  kind: &'static str,
  doc:  Document,
}

impl Fields {
  pub fn new(kind: &'static str, doc: Document) -> Self { Self { kind, doc } }

  /// The record kind used in error messages.
  pub fn kind(&self) -> &'static str { self.kind }

  fn take(&mut self, field: &str) -> Option<Bson> {
    match self.doc.remove(field) {
      None | Some(Bson::Null) => None,
      Some(value) => Some(value),
    }
  }

  pub fn take_str(&mut self, field: &'static str) -> Result<Option<String>> {
    match self.take(field) {
      None => Ok(None),
      Some(Bson::String(s)) => Ok(Some(s)),
      Some(other) => Err(Error::invalid(self.kind, field, other)),
    }
  }

  pub fn require_str(&mut self, field: &'static str) -> Result<String> {
    self
      .take_str(field)?
      .ok_or_else(|| Error::missing(self.kind, field))
  }

  pub fn take_bool(&mut self, field: &'static str) -> Result<Option<bool>> {
    match self.take(field) {
      None => Ok(None),
      Some(Bson::Boolean(b)) => Ok(Some(b)),
      Some(other) => Err(Error::invalid(self.kind, field, other)),
    }
  }

  pub fn take_i32(&mut self, field: &'static str) -> Result<Option<i32>> {
    match self.take(field) {
      None => Ok(None),
      Some(Bson::Int32(n)) => Ok(Some(n)),
      Some(Bson::Int64(n)) => i32::try_from(n)
        .map(Some)
        .map_err(|_| Error::invalid(self.kind, field, n)),
      Some(other) => Err(Error::invalid(self.kind, field, other)),
    }
  }

  pub fn take_timestamp(&mut self, field: &'static str) -> Result<Timestamp> {
    match self.take(field) {
      None => Ok(Timestamp::Unset),
      Some(Bson::Boolean(true)) => Ok(Timestamp::Now),
      Some(Bson::DateTime(dt)) => Ok(Timestamp::Explicit(dt.to_chrono())),
      Some(other) => Err(Error::invalid(self.kind, field, other)),
    }
  }

  /// Read an identifier given either natively or as its hex string form.
  pub fn take_object_id(
    &mut self,
    field: &'static str,
  ) -> Result<Option<ObjectId>> {
    match self.take(field) {
      None => Ok(None),
      Some(Bson::ObjectId(oid)) => Ok(Some(oid)),
      Some(Bson::String(s)) => ObjectId::parse_str(&s)
        .map(Some)
        .map_err(|_| Error::invalid(self.kind, field, format!("{s:?}"))),
      Some(other) => Err(Error::invalid(self.kind, field, other)),
    }
  }

  pub fn take_document(
    &mut self,
    field: &'static str,
  ) -> Result<Option<Document>> {
    match self.take(field) {
      None => Ok(None),
      Some(Bson::Document(d)) => Ok(Some(d)),
      Some(other) => Err(Error::invalid(self.kind, field, other)),
    }
  }

  /// Apply `policy` to whatever no layer consumed, returning the fields to
  /// carry through.
  pub fn finish(self, policy: UnknownFieldPolicy) -> Result<Document> {
    if self.doc.is_empty() {
      return Ok(self.doc);
    }
    let fields: Vec<String> = self.doc.keys().cloned().collect();
    match policy {
      UnknownFieldPolicy::Reject => Err(Error::UnknownField {
        kind: self.kind,
        fields,
      }),
      UnknownFieldPolicy::Passthrough => {
        tracing::warn!(kind = self.kind, ?fields, "keeping unknown fields");
        Ok(self.doc)
      }
    }
  }
}

/// Copy `extra` into `doc` without overwriting recognised fields.
pub(crate) fn merge_passthrough(doc: &mut Document, extra: &Document) {
  for (key, value) in extra {
    if !doc.contains_key(key) {
      doc.insert(key.clone(), value.clone());
    }
  }
}
