//! The element hierarchy: validated records with provenance metadata.
//!
//! Concrete records are built by composition: a [`PrimaryElement`] wraps a
//! [`VerifiedElement`], which wraps an [`Element`]. Each layer pops its own
//! fields from a shared [`Fields`] reader and writes them back in
//! `to_document`. The passthrough leftovers always live on the innermost
//! [`Element`].

use std::fmt;

use bson::Document;
use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  document::{Fields, Timestamp, UnknownFieldPolicy, datetime_to_bson},
};

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A typed record that converts to and from a store document.
pub trait DocumentRecord: Sized {
  /// Record kind, used in error messages and logs.
  const KIND: &'static str;

  /// Build the record from an owned snapshot of a stored document.
  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self>;

  /// Serialise the record, including passthrough fields.
  fn to_document(&self) -> Document;

  /// Fields carried through unmodified under
  /// [`UnknownFieldPolicy::Passthrough`].
  fn passthrough(&self) -> &Document;

  /// Serialise only the recognised fields.
  fn to_normalized_document(&self) -> Document {
    let mut doc = self.to_document();
    for key in self.passthrough().keys() {
      doc.remove(key);
    }
    doc
  }
}

/// A record that can live in an [`ElementList`](crate::list::ElementList).
pub trait KeyedElement: DocumentRecord + Clone + fmt::Debug + PartialEq {
  type Key: Clone + Eq + fmt::Debug + fmt::Display;

  fn key(&self) -> &Self::Key;
}

/// A keyed element carrying a primary flag, for use in a
/// [`PrimaryElementList`](crate::list::PrimaryElementList).
pub trait HasPrimary: KeyedElement {
  fn primary_element(&self) -> &PrimaryElement;
  fn primary_element_mut(&mut self) -> &mut PrimaryElement;

  fn is_primary(&self) -> bool { self.primary_element().is_primary() }
  fn is_verified(&self) -> bool { self.primary_element().is_verified() }
}

/// Normalise a string used as a lookup key.
pub(crate) fn normalize_key(value: &str) -> String { value.to_lowercase() }

// ─── Element ─────────────────────────────────────────────────────────────────

/// Provenance shared by every element: who created it, and when.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
  created_by:  Option<String>,
  created_ts:  Option<DateTime<Utc>>,
  passthrough: Document,
}

impl Element {
  pub fn new(created_by: Option<String>, created_ts: Timestamp) -> Self {
    Self {
      created_by,
      created_ts: created_ts.resolve(),
      passthrough: Document::new(),
    }
  }

  pub(crate) fn read(fields: &mut Fields) -> Result<Self> {
    Ok(Self {
      created_by:  fields.take_str("created_by")?,
      created_ts:  fields.take_timestamp("created_ts")?.resolve(),
      passthrough: Document::new(),
    })
  }

  pub(crate) fn write(&self, doc: &mut Document) {
    if let Some(by) = &self.created_by {
      doc.insert("created_by", by.clone());
    }
    if let Some(ts) = self.created_ts {
      doc.insert("created_ts", datetime_to_bson(ts));
    }
  }

  pub(crate) fn set_passthrough(&mut self, extra: Document) {
    self.passthrough = extra;
  }

  /// Identifier of the application that created the element.
  pub fn created_by(&self) -> Option<&str> { self.created_by.as_deref() }

  pub fn set_created_by(&mut self, value: impl Into<String>) {
    self.created_by = Some(value.into());
  }

  pub fn created_ts(&self) -> Option<DateTime<Utc>> { self.created_ts }

  /// [`Timestamp::Unset`] leaves the current value in place.
  pub fn set_created_ts(&mut self, value: Timestamp) {
    if let Some(ts) = value.resolve() {
      self.created_ts = Some(ts);
    }
  }

  pub fn passthrough(&self) -> &Document { &self.passthrough }
}

// ─── VerifiedElement ─────────────────────────────────────────────────────────

/// An element with a verification lifecycle.
///
/// `verified_by` and `verified_ts` are only meaningful while `verified` is
/// set, but writing them does not imply verification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VerifiedElement {
  element:           Element,
  verified:          bool,
  verified_by:       Option<String>,
  verified_ts:       Option<DateTime<Utc>>,
  verification_code: Option<String>,
}

impl VerifiedElement {
  pub fn new(element: Element, verified: bool) -> Self {
    Self {
      element,
      verified,
      ..Self::default()
    }
  }

  pub(crate) fn read(fields: &mut Fields) -> Result<Self> {
    Ok(Self {
      element:           Element::read(fields)?,
      verified:          fields.take_bool("verified")?.unwrap_or(false),
      verified_by:       fields.take_str("verified_by")?,
      verified_ts:       fields.take_timestamp("verified_ts")?.resolve(),
      verification_code: fields.take_str("verification_code")?,
    })
  }

  pub(crate) fn write(&self, doc: &mut Document) {
    self.element.write(doc);
    doc.insert("verified", self.verified);
    if let Some(by) = &self.verified_by {
      doc.insert("verified_by", by.clone());
    }
    if let Some(ts) = self.verified_ts {
      doc.insert("verified_ts", datetime_to_bson(ts));
    }
    if let Some(code) = &self.verification_code {
      doc.insert("verification_code", code.clone());
    }
  }

  pub fn element(&self) -> &Element { &self.element }
  pub fn element_mut(&mut self) -> &mut Element { &mut self.element }

  pub fn is_verified(&self) -> bool { self.verified }

  /// Always legal, including `false` to un-verify.
  pub fn set_verified(&mut self, value: bool) { self.verified = value; }

  pub fn verified_by(&self) -> Option<&str> { self.verified_by.as_deref() }

  pub fn set_verified_by(&mut self, value: impl Into<String>) {
    self.verified_by = Some(value.into());
  }

  pub fn verified_ts(&self) -> Option<DateTime<Utc>> { self.verified_ts }

  pub fn set_verified_ts(&mut self, value: Timestamp) {
    if let Some(ts) = value.resolve() {
      self.verified_ts = Some(ts);
    }
  }

  pub fn verification_code(&self) -> Option<&str> {
    self.verification_code.as_deref()
  }

  pub fn set_verification_code(&mut self, value: impl Into<String>) {
    self.verification_code = Some(value.into());
  }

  /// Mark verified by `application` at the current time.
  pub fn verify(&mut self, application: impl Into<String>) {
    self.verified = true;
    self.verified_by = Some(application.into());
    self.verified_ts = Timestamp::Now.resolve();
  }
}

// ─── PrimaryElement ──────────────────────────────────────────────────────────

/// A verified element that may be flagged as the user's preferred one.
///
/// A primary element must be verified. Uniqueness of the flag across a list
/// is enforced by [`PrimaryElementList`](crate::list::PrimaryElementList).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimaryElement {
  verified: VerifiedElement,
  primary:  bool,
}

impl PrimaryElement {
  pub fn new(verified: VerifiedElement, primary: bool) -> Result<Self> {
    let mut this = Self {
      verified,
      primary: false,
    };
    this.set_primary(primary)?;
    Ok(this)
  }

  pub(crate) fn read(fields: &mut Fields) -> Result<Self> {
    let verified = VerifiedElement::read(fields)?;
    let primary = fields.take_bool("primary")?.unwrap_or(false);
    if primary && !verified.is_verified() {
      return Err(Error::primary(
        fields.kind(),
        "primary element must be verified",
      ));
    }
    Ok(Self { verified, primary })
  }

  pub(crate) fn write(&self, doc: &mut Document) {
    self.verified.write(doc);
    doc.insert("primary", self.primary);
  }

  pub fn verification(&self) -> &VerifiedElement { &self.verified }
  pub fn verification_mut(&mut self) -> &mut VerifiedElement {
    &mut self.verified
  }

  pub fn element(&self) -> &Element { self.verified.element() }
  pub fn element_mut(&mut self) -> &mut Element { self.verified.element_mut() }

  pub fn is_verified(&self) -> bool { self.verified.is_verified() }
  pub fn is_primary(&self) -> bool { self.primary }

  /// Flag or unflag this element as primary. Flagging requires the element
  /// to be verified.
  pub fn set_primary(&mut self, value: bool) -> Result<()> {
    if value && !self.is_verified() {
      return Err(Error::primary(
        "primary element",
        "primary element must be verified",
      ));
    }
    self.primary = value;
    Ok(())
  }

  /// Set the flag without the verification check; the list has already
  /// validated the whole assignment.
  pub(crate) fn mark_primary(&mut self, value: bool) { self.primary = value; }
}
