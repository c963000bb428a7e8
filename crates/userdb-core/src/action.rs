//! Actions: queued units of work the IdP runs for a user at login.
//!
//! An action is a standalone document, not a list member. Consumers look
//! actions up by user and sort them by `preference`.

use std::fmt;

use bson::{Document, doc, oid::ObjectId};

use crate::{
  Error, Result,
  document::{Fields, UnknownFieldPolicy, merge_passthrough},
  element::DocumentRecord,
};

/// Sort key given to actions that do not specify one.
pub const DEFAULT_PREFERENCE: i32 = 100;

/// Document shape: `{_id, user_oid, action, preference, session?, params}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
  id:          ObjectId,
  user_oid:    ObjectId,
  action_type: String,
  preference:  i32,
  /// IdP session the action is bound to; empty when unbound.
  session:     String,
  params:      Document,
  passthrough: Document,
}

// ─── NewAction ───────────────────────────────────────────────────────────────

/// Explicit fields for a new [`Action`]. Converted to a document and
/// validated exactly like a stored one.
#[derive(Debug, Clone, Default)]
pub struct NewAction {
  pub action_id:   Option<ObjectId>,
  pub user_oid:    Option<ObjectId>,
  pub action_type: Option<String>,
  pub preference:  Option<i32>,
  pub session:     Option<String>,
  pub params:      Option<Document>,
}

impl NewAction {
  /// Convenience constructor with all optional fields set to their defaults.
  pub fn new(user_oid: ObjectId, action_type: impl Into<String>) -> Self {
    Self {
      user_oid: Some(user_oid),
      action_type: Some(action_type.into()),
      ..Self::default()
    }
  }

  fn into_document(self) -> Document {
    let mut doc = Document::new();
    if let Some(id) = self.action_id {
      doc.insert("_id", id);
    }
    if let Some(user_oid) = self.user_oid {
      doc.insert("user_oid", user_oid);
    }
    if let Some(action_type) = self.action_type {
      doc.insert("action", action_type);
    }
    if let Some(preference) = self.preference {
      doc.insert("preference", preference);
    }
    doc.insert("session", self.session.unwrap_or_default());
    doc.insert("params", self.params.unwrap_or_default());
    doc
  }
}

// ─── Action ──────────────────────────────────────────────────────────────────

impl Action {
  pub fn from_new(input: NewAction) -> Result<Self> {
    Self::from_document(input.into_document(), UnknownFieldPolicy::Reject)
  }

  pub fn action_id(&self) -> &ObjectId { &self.id }
  pub fn user_id(&self) -> &ObjectId { &self.user_oid }
  pub fn action_type(&self) -> &str { &self.action_type }
  pub fn preference(&self) -> i32 { self.preference }
  pub fn session(&self) -> &str { &self.session }
  pub fn params(&self) -> &Document { &self.params }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Action {} for {}", self.action_type, self.user_oid)
  }
}

impl DocumentRecord for Action {
  const KIND: &'static str = "action";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let id = fields.take_object_id("_id")?.unwrap_or_else(ObjectId::new);
    let user_oid = fields
      .take_object_id("user_oid")?
      .ok_or_else(|| Error::missing(Self::KIND, "user_oid"))?;
    let action_type = fields.require_str("action")?;
    let preference = fields
      .take_i32("preference")?
      .unwrap_or(DEFAULT_PREFERENCE);
    let session = fields.take_str("session")?.unwrap_or_default();
    let params = fields.take_document("params")?.unwrap_or_default();
    let passthrough = fields.finish(policy)?;
    Ok(Self {
      id,
      user_oid,
      action_type,
      preference,
      session,
      params,
      passthrough,
    })
  }

  fn to_document(&self) -> Document {
    let mut doc = doc! {
      "_id": self.id,
      "user_oid": self.user_oid,
      "action": self.action_type.clone(),
      "preference": self.preference,
      "params": self.params.clone(),
    };
    if !self.session.is_empty() {
      doc.insert("session", self.session.clone());
    }
    merge_passthrough(&mut doc, &self.passthrough);
    doc
  }

  fn passthrough(&self) -> &Document { &self.passthrough }
}
