//! National identity numbers (NINs).

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

/// A national identity number attached to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Nin {
  base:   PrimaryElement,
  number: String,
}

pub type NinList = PrimaryElementList<Nin>;

impl Nin {
  pub fn new(
    number: impl Into<String>,
    application: impl Into<String>,
    verified: bool,
    primary: bool,
  ) -> Result<Self> {
    Self::from_document(
      doc! {
        "number": number.into(),
        "created_by": application.into(),
        "created_ts": Timestamp::Now.to_bson(),
        "verified": verified,
        "primary": primary,
      },
      UnknownFieldPolicy::Reject,
    )
  }

  pub fn number(&self) -> &str { &self.number }

  pub fn verification(&self) -> &VerifiedElement { self.base.verification() }
  pub fn verification_mut(&mut self) -> &mut VerifiedElement {
    self.base.verification_mut()
  }

  pub fn element(&self) -> &Element { self.base.element() }
}

impl DocumentRecord for Nin {
  const KIND: &'static str = "nin";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut base = PrimaryElement::read(&mut fields)?;
    let number = normalize_key(&fields.require_str("number")?);
    base.element_mut().set_passthrough(fields.finish(policy)?);
    Ok(Self { base, number })
  }

  fn to_document(&self) -> Document {
    let mut doc = doc! { "number": self.number.clone() };
    self.base.write(&mut doc);
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.base.element().passthrough() }
}

impl KeyedElement for Nin {
  type Key = String;

  fn key(&self) -> &String { &self.number }
}

impl HasPrimary for Nin {
  fn primary_element(&self) -> &PrimaryElement { &self.base }
  fn primary_element_mut(&mut self) -> &mut PrimaryElement { &mut self.base }
}
