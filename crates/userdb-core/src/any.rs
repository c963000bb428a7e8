//! Dynamically-typed elements, for tooling that learns the kind of a
//! document at runtime.

use std::{fmt, str::FromStr};

use bson::Document;

use crate::{
  Error, Result,
  document::UnknownFieldPolicy,
  element::DocumentRecord,
  mail::MailAddress,
  nin::Nin,
  phone::PhoneNumber,
  proofing::NinProofingElement,
  tou::ToUEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
  Phone,
  Mail,
  Nin,
  NinProofing,
  ToU,
}

impl ElementKind {
  pub const ALL: [ElementKind; 5] = [
    Self::Phone,
    Self::Mail,
    Self::Nin,
    Self::NinProofing,
    Self::ToU,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Phone => "phone",
      Self::Mail => "mail",
      Self::Nin => "nin",
      Self::NinProofing => "nin-proofing",
      Self::ToU => "tou",
    }
  }
}

impl fmt::Display for ElementKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ElementKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|kind| kind.as_str() == s)
      .ok_or_else(|| Error::invalid("element kind", "kind", format!("{s:?}")))
  }
}

/// Any concrete element.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyElement {
  Phone(PhoneNumber),
  Mail(MailAddress),
  Nin(Nin),
  NinProofing(NinProofingElement),
  ToU(ToUEvent),
}

impl AnyElement {
  pub fn from_document(
    kind: ElementKind,
    doc: Document,
    policy: UnknownFieldPolicy,
  ) -> Result<Self> {
    Ok(match kind {
      ElementKind::Phone => Self::Phone(PhoneNumber::from_document(doc, policy)?),
      ElementKind::Mail => Self::Mail(MailAddress::from_document(doc, policy)?),
      ElementKind::Nin => Self::Nin(Nin::from_document(doc, policy)?),
      ElementKind::NinProofing => {
        Self::NinProofing(NinProofingElement::from_document(doc, policy)?)
      }
      ElementKind::ToU => Self::ToU(ToUEvent::from_document(doc, policy)?),
    })
  }

  pub fn kind(&self) -> ElementKind {
    match self {
      Self::Phone(_) => ElementKind::Phone,
      Self::Mail(_) => ElementKind::Mail,
      Self::Nin(_) => ElementKind::Nin,
      Self::NinProofing(_) => ElementKind::NinProofing,
      Self::ToU(_) => ElementKind::ToU,
    }
  }

  pub fn to_document(&self) -> Document {
    match self {
      Self::Phone(e) => e.to_document(),
      Self::Mail(e) => e.to_document(),
      Self::Nin(e) => e.to_document(),
      Self::NinProofing(e) => e.to_document(),
      Self::ToU(e) => e.to_document(),
    }
  }

  pub fn to_normalized_document(&self) -> Document {
    match self {
      Self::Phone(e) => e.to_normalized_document(),
      Self::Mail(e) => e.to_normalized_document(),
      Self::Nin(e) => e.to_normalized_document(),
      Self::NinProofing(e) => e.to_normalized_document(),
      Self::ToU(e) => e.to_normalized_document(),
    }
  }

  /// Compare two elements of the same kind. Elements of different kinds are
  /// not comparable and yield [`Error::TypeMismatch`].
  pub fn try_eq(&self, other: &Self) -> Result<bool> {
    if self.kind() != other.kind() {
      return Err(Error::TypeMismatch {
        left:  self.kind().as_str(),
        right: other.kind().as_str(),
      });
    }
    Ok(self == other)
  }
}
