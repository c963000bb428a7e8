//! E-mail addresses.

use bson::{Document, doc};

use crate::{
  Result,
  document::{Fields, Timestamp, UnknownFieldPolicy, merge_passthrough},
  element::{
    DocumentRecord, Element, HasPrimary, KeyedElement, PrimaryElement,
    VerifiedElement, normalize_key,
  },
  list::PrimaryElementList,
};

/// A user's e-mail address, keyed by the lower-cased address.
#[derive(Debug, Clone, PartialEq)]
pub struct MailAddress {
  base:  PrimaryElement,
  email: String,
}

pub type MailAddressList = PrimaryElementList<MailAddress>;

impl MailAddress {
  pub fn new(
    email: impl Into<String>,
    application: impl Into<String>,
    verified: bool,
    primary: bool,
  ) -> Result<Self> {
    Self::from_document(
      doc! {
        "email": email.into(),
        "created_by": application.into(),
        "created_ts": Timestamp::Now.to_bson(),
        "verified": verified,
        "primary": primary,
      },
      UnknownFieldPolicy::Reject,
    )
  }

  pub fn email(&self) -> &str { &self.email }

  pub fn set_email(&mut self, value: impl AsRef<str>) {
    self.email = normalize_key(value.as_ref());
  }

  pub fn verification(&self) -> &VerifiedElement { self.base.verification() }
  pub fn verification_mut(&mut self) -> &mut VerifiedElement {
    self.base.verification_mut()
  }

  pub fn element(&self) -> &Element { self.base.element() }
}

impl DocumentRecord for MailAddress {
  const KIND: &'static str = "mail";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut base = PrimaryElement::read(&mut fields)?;
    let email = normalize_key(&fields.require_str("email")?);
    base.element_mut().set_passthrough(fields.finish(policy)?);
    Ok(Self { base, email })
  }

  fn to_document(&self) -> Document {
    let mut doc = doc! { "email": self.email.clone() };
    self.base.write(&mut doc);
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.base.element().passthrough() }
}

impl KeyedElement for MailAddress {
  type Key = String;

  fn key(&self) -> &String { &self.email }
}

impl HasPrimary for MailAddress {
  fn primary_element(&self) -> &PrimaryElement { &self.base }
  fn primary_element_mut(&mut self) -> &mut PrimaryElement { &mut self.base }
}
