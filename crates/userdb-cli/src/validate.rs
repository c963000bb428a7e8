//! `userdb validate`: run documents through the typed model and return
//! their normalized form.

use anyhow::{Context as _, Result, bail};
use bson::{Bson, Document};
use clap::ValueEnum;
use userdb_core::{
  DocumentRecord, ElementList, UnknownFieldPolicy,
  action::Action,
  any::{AnyElement, ElementKind},
  mail::MailAddressList,
  nin::NinList,
  phone::PhoneNumberList,
  proofing::{LetterProofingState, NinProofingElement, OidcProofingState},
  tou::ToUList,
};

/// Record types accepted by `validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
  Phone,
  Mail,
  Nin,
  NinProofing,
  Tou,
  Action,
  LetterState,
  OidcState,
}

impl Kind {
  fn element_kind(self) -> Option<ElementKind> {
    match self {
      Self::Phone => Some(ElementKind::Phone),
      Self::Mail => Some(ElementKind::Mail),
      Self::Nin => Some(ElementKind::Nin),
      Self::NinProofing => Some(ElementKind::NinProofing),
      Self::Tou => Some(ElementKind::ToU),
      Self::Action | Self::LetterState | Self::OidcState => None,
    }
  }
}

/// Parse relaxed or canonical extended JSON into BSON.
pub fn parse_json(raw: &str) -> Result<Bson> {
  let value: serde_json::Value =
    serde_json::from_str(raw).context("input is not valid JSON")?;
  Bson::try_from(value).context("input is not valid extended JSON")
}

/// Render documents as relaxed extended JSON.
pub fn to_json(docs: Vec<Document>) -> serde_json::Value {
  serde_json::Value::Array(
    docs
      .into_iter()
      .map(|d| Bson::Document(d).into_relaxed_extjson())
      .collect(),
  )
}

fn documents(input: Bson) -> Result<Vec<Document>> {
  let Bson::Array(items) = input else {
    bail!("--list expects a JSON array");
  };
  items
    .into_iter()
    .enumerate()
    .map(|(i, item)| match item {
      Bson::Document(d) => Ok(d),
      other => bail!("list item {i} is not an object: {other}"),
    })
    .collect()
}

/// Build the typed value(s) for `kind` from `input` and return the
/// normalized documents.
pub fn validate(
  kind: Kind,
  input: Bson,
  list: bool,
  policy: UnknownFieldPolicy,
) -> Result<Vec<Document>> {
  if list {
    return validate_list(kind, documents(input)?, policy);
  }

  let Bson::Document(doc) = input else {
    bail!("expected a JSON object (use --list for arrays)");
  };
  let normalized = match kind {
    Kind::Action => Action::from_document(doc, policy)?.to_normalized_document(),
    Kind::LetterState => {
      LetterProofingState::from_document(doc, policy)?.to_normalized_document()
    }
    Kind::OidcState => {
      OidcProofingState::from_document(doc, policy)?.to_normalized_document()
    }
    _ => {
      let element = kind
        .element_kind()
        .context("not an element kind")?;
      AnyElement::from_document(element, doc, policy)?.to_normalized_document()
    }
  };
  Ok(vec![normalized])
}

fn validate_list(
  kind: Kind,
  docs: Vec<Document>,
  policy: UnknownFieldPolicy,
) -> Result<Vec<Document>> {
  let normalized = match kind {
    Kind::Phone => {
      PhoneNumberList::from_documents(docs, policy)?.to_normalized_documents()
    }
    Kind::Mail => {
      MailAddressList::from_documents(docs, policy)?.to_normalized_documents()
    }
    Kind::Nin => NinList::from_documents(docs, policy)?.to_normalized_documents(),
    Kind::NinProofing => {
      ElementList::<NinProofingElement>::from_documents(docs, policy)?
        .to_normalized_documents()
    }
    Kind::Tou => ToUList::from_documents(docs, policy)?.to_normalized_documents(),
    Kind::Action => each::<Action>(docs, policy)?,
    Kind::LetterState => each::<LetterProofingState>(docs, policy)?,
    Kind::OidcState => each::<OidcProofingState>(docs, policy)?,
  };
  Ok(normalized)
}

fn each<T: DocumentRecord>(
  docs: Vec<Document>,
  policy: UnknownFieldPolicy,
) -> Result<Vec<Document>> {
  docs
    .into_iter()
    .map(|d| Ok(T::from_document(d, policy)?.to_normalized_document()))
    .collect()
}
