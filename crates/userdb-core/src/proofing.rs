//! Proofing states: per-flow records of an identity verification in
//! progress, keyed by the user's eduPersonPrincipalName.

use std::fmt;

use bson::{Bson, Document, doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{
    Fields, Timestamp, UnknownFieldPolicy, merge_passthrough, optional_to_bson,
  },
  element::{DocumentRecord, Element, KeyedElement, VerifiedElement, normalize_key},
};

const EPPN_FIELD: &str = "eduPersonPrincipalName";

/// A stored proofing state. One state per user and flow.
pub trait ProofingState:
  DocumentRecord + Clone + fmt::Debug + Send + Sync + 'static
{
  fn id(&self) -> &ObjectId;
  fn eppn(&self) -> &str;
}

// ─── NinProofingElement ──────────────────────────────────────────────────────

/// The NIN being proofed, with the verification metadata a proofing log
/// needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NinProofingElement {
  verified: VerifiedElement,
  number:   String,
}

impl NinProofingElement {
  pub fn new(
    number: impl Into<String>,
    application: impl Into<String>,
    created_ts: Timestamp,
    verification_code: Option<String>,
  ) -> Result<Self> {
    let created_ts = match created_ts {
      Timestamp::Unset => Timestamp::Now,
      other => other,
    };
    let mut doc = doc! {
      "number": number.into(),
      "created_by": application.into(),
      "created_ts": created_ts.to_bson(),
      "verified": false,
    };
    if let Some(code) = verification_code {
      doc.insert("verification_code", code);
    }
    Self::from_document(doc, UnknownFieldPolicy::Reject)
  }

  pub fn number(&self) -> &str { &self.number }

  pub fn set_number(&mut self, value: &str) {
    self.number = normalize_key(value);
  }

  pub fn verification(&self) -> &VerifiedElement { &self.verified }
  pub fn verification_mut(&mut self) -> &mut VerifiedElement {
    &mut self.verified
  }
}

impl DocumentRecord for NinProofingElement {
  const KIND: &'static str = "nin proofing";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut verified = VerifiedElement::read(&mut fields)?;
    let number = normalize_key(&fields.require_str("number")?);
    // Copied from a user's NIN list; the primary flag has no meaning here.
    fields.take_bool("primary")?;
    verified.element_mut().set_passthrough(fields.finish(policy)?);
    Ok(Self { verified, number })
  }

  fn to_document(&self) -> Document {
    let mut doc = doc! { "number": self.number.clone() };
    self.verified.write(&mut doc);
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.verified.element().passthrough() }
}

impl KeyedElement for NinProofingElement {
  type Key = String;

  fn key(&self) -> &String { &self.number }
}

// ─── SentLetterElement ───────────────────────────────────────────────────────

/// Progress of a verification letter handed to the letter service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SentLetterElement {
  element:        Element,
  is_sent:        bool,
  sent_ts:        Option<DateTime<Utc>>,
  transaction_id: Option<String>,
  /// Official postal address, as returned by the population register.
  address:        Option<Document>,
}

impl SentLetterElement {
  pub fn element(&self) -> &Element { &self.element }
  pub fn element_mut(&mut self) -> &mut Element { &mut self.element }

  pub fn is_sent(&self) -> bool { self.is_sent }
  pub fn set_is_sent(&mut self, value: bool) { self.is_sent = value; }

  pub fn sent_ts(&self) -> Option<DateTime<Utc>> { self.sent_ts }

  /// [`Timestamp::Unset`] leaves the current value in place.
  pub fn set_sent_ts(&mut self, value: Timestamp) {
    if let Some(ts) = value.resolve() {
      self.sent_ts = Some(ts);
    }
  }

  pub fn transaction_id(&self) -> Option<&str> {
    self.transaction_id.as_deref()
  }

  pub fn set_transaction_id(&mut self, value: impl Into<String>) {
    self.transaction_id = Some(value.into());
  }

  pub fn address(&self) -> Option<&Document> { self.address.as_ref() }
  pub fn set_address(&mut self, value: Option<Document>) {
    self.address = value;
  }
}

impl DocumentRecord for SentLetterElement {
  const KIND: &'static str = "sent letter";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut element = Element::read(&mut fields)?;
    let is_sent = fields.take_bool("is_sent")?.unwrap_or(false);
    let sent_ts = fields.take_timestamp("sent_ts")?.resolve();
    let transaction_id = fields.take_str("transaction_id")?;
    let address = fields.take_document("address")?;
    element.set_passthrough(fields.finish(policy)?);
    Ok(Self {
      element,
      is_sent,
      sent_ts,
      transaction_id,
      address,
    })
  }

  fn to_document(&self) -> Document {
    let mut doc = Document::new();
    self.element.write(&mut doc);
    doc.insert("is_sent", self.is_sent);
    doc.insert(
      "sent_ts",
      optional_to_bson(self.sent_ts.map(bson::DateTime::from_chrono)),
    );
    doc.insert("transaction_id", optional_to_bson(self.transaction_id.clone()));
    doc.insert("address", optional_to_bson(self.address.clone()));
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.element.passthrough() }
}

// ─── Shared state fields ─────────────────────────────────────────────────────

/// Reads the `_id`, eppn and `nin` fields every proofing state carries.
fn read_common(
  fields: &mut Fields,
  policy: UnknownFieldPolicy,
) -> Result<(ObjectId, String, NinProofingElement)> {
  let id = fields.take_object_id("_id")?.unwrap_or_else(ObjectId::new);
  let eppn = fields.require_str(EPPN_FIELD)?;
  let nin = fields
    .take_document("nin")?
    .ok_or_else(|| Error::missing(fields.kind(), "nin"))?;
  let nin = NinProofingElement::from_document(nin, policy)?;
  Ok((id, eppn, nin))
}

fn write_common(id: &ObjectId, eppn: &str, nin: &NinProofingElement) -> Document {
  let mut doc = doc! { "_id": *id };
  doc.insert(EPPN_FIELD, eppn);
  doc.insert("nin", nin.to_document());
  doc
}

// ─── LetterProofingState ─────────────────────────────────────────────────────

/// State of a proofing by postal letter to the user's registered address.
#[derive(Debug, Clone, PartialEq)]
pub struct LetterProofingState {
  id:              ObjectId,
  eppn:            String,
  nin:             NinProofingElement,
  proofing_letter: SentLetterElement,
  passthrough:     Document,
}

impl LetterProofingState {
  pub fn new(eppn: impl Into<String>, nin: NinProofingElement) -> Self {
    Self {
      id: ObjectId::new(),
      eppn: eppn.into(),
      nin,
      proofing_letter: SentLetterElement::default(),
      passthrough: Document::new(),
    }
  }

  pub fn nin(&self) -> &NinProofingElement { &self.nin }
  pub fn nin_mut(&mut self) -> &mut NinProofingElement { &mut self.nin }

  pub fn proofing_letter(&self) -> &SentLetterElement { &self.proofing_letter }
  pub fn proofing_letter_mut(&mut self) -> &mut SentLetterElement {
    &mut self.proofing_letter
  }
}

impl DocumentRecord for LetterProofingState {
  const KIND: &'static str = "letter proofing state";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let (id, eppn, nin) = read_common(&mut fields, policy)?;
    let proofing_letter = match fields.take_document("proofing_letter")? {
      Some(letter) => SentLetterElement::from_document(letter, policy)?,
      None => SentLetterElement::default(),
    };
    let passthrough = fields.finish(policy)?;
    Ok(Self {
      id,
      eppn,
      nin,
      proofing_letter,
      passthrough,
    })
  }

  fn to_document(&self) -> Document {
    let mut doc = write_common(&self.id, &self.eppn, &self.nin);
    doc.insert("proofing_letter", self.proofing_letter.to_document());
    merge_passthrough(&mut doc, &self.passthrough);
    doc
  }

  fn passthrough(&self) -> &Document { &self.passthrough }
}

impl ProofingState for LetterProofingState {
  fn id(&self) -> &ObjectId { &self.id }
  fn eppn(&self) -> &str { &self.eppn }
}

// ─── OidcProofingState ───────────────────────────────────────────────────────

/// State of a proofing through an external OpenID Connect provider.
///
/// `state`, `nonce` and `token` correlate the provider's callback with this
/// record.
#[derive(Debug, Clone, PartialEq)]
pub struct OidcProofingState {
  id:          ObjectId,
  eppn:        String,
  nin:         NinProofingElement,
  state:       String,
  nonce:       String,
  token:       String,
  passthrough: Document,
}

impl OidcProofingState {
  /// Start a new flow with freshly generated correlation values.
  pub fn new(eppn: impl Into<String>, nin: NinProofingElement) -> Self {
    Self {
      id: ObjectId::new(),
      eppn: eppn.into(),
      nin,
      state: Uuid::new_v4().to_string(),
      nonce: Uuid::new_v4().to_string(),
      token: Uuid::new_v4().to_string(),
      passthrough: Document::new(),
    }
  }

  pub fn nin(&self) -> &NinProofingElement { &self.nin }
  pub fn nin_mut(&mut self) -> &mut NinProofingElement { &mut self.nin }

  pub fn state(&self) -> &str { &self.state }
  pub fn nonce(&self) -> &str { &self.nonce }
  pub fn token(&self) -> &str { &self.token }
}

impl DocumentRecord for OidcProofingState {
  const KIND: &'static str = "oidc proofing state";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let (id, eppn, nin) = read_common(&mut fields, policy)?;
    let state = fields.require_str("state")?;
    let nonce = fields.require_str("nonce")?;
    let token = fields.require_str("token")?;
    let passthrough = fields.finish(policy)?;
    Ok(Self {
      id,
      eppn,
      nin,
      state,
      nonce,
      token,
      passthrough,
    })
  }

  fn to_document(&self) -> Document {
    let mut doc = write_common(&self.id, &self.eppn, &self.nin);
    doc.insert("state", self.state.clone());
    doc.insert("nonce", self.nonce.clone());
    doc.insert("token", self.token.clone());
    merge_passthrough(&mut doc, &self.passthrough);
    doc
  }

  fn passthrough(&self) -> &Document { &self.passthrough }
}

impl ProofingState for OidcProofingState {
  fn id(&self) -> &ObjectId { &self.id }
  fn eppn(&self) -> &str { &self.eppn }
}

/// Extract the value to look a state up by, for use in store queries.
pub(crate) fn eppn_query(eppn: &str) -> (&'static str, Bson) {
  (EPPN_FIELD, Bson::String(eppn.to_owned()))
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use super::*;
  use crate::nin::Nin;

  const EPPN: &str = "foob-arra";

  fn keys(doc: &Document) -> BTreeSet<&str> {
    doc.keys().map(String::as_str).collect()
  }

  fn address() -> Document {
    doc! {
      "Name": {
        "GivenNameMarking": "20",
        "GivenName": "Testaren Test",
        "SurName": "Testsson",
      },
      "OfficialAddress": {
        "Address2": "ÖRGATAN 79 LGH 10",
        "PostalCode": "12345",
        "City": "LANDET",
      },
    }
  }

  #[test]
  fn letter_state_document_shape() {
    let mut state = LetterProofingState::from_document(
      doc! {
        "eduPersonPrincipalName": EPPN,
        "nin": {
          "number": "200102034567",
          "created_by": "eduid_letter_proofing",
          "created_ts": true,
          "verified": false,
          "verification_code": "abc123",
        },
      },
      UnknownFieldPolicy::Reject,
    )
    .unwrap();
    state.proofing_letter_mut().set_address(Some(address()));

    let d = state.to_document();
    assert_eq!(
      keys(&d),
      BTreeSet::from(["_id", "eduPersonPrincipalName", "nin", "proofing_letter"])
    );
    assert_eq!(
      keys(d.get_document("nin").unwrap()),
      BTreeSet::from([
        "created_by",
        "created_ts",
        "number",
        "verified",
        "verification_code",
      ])
    );
    let letter = d.get_document("proofing_letter").unwrap();
    assert_eq!(
      keys(letter),
      BTreeSet::from(["is_sent", "sent_ts", "transaction_id", "address"])
    );
    assert_eq!(letter.get("sent_ts"), Some(&Bson::Null));
    assert_eq!(letter.get_document("address").unwrap(), &address());
  }

  #[test]
  fn oidc_state_document_shape() {
    let nin =
      Nin::new("200102034567", "eduid_oidc_proofing", false, false).unwrap();
    let state = OidcProofingState::from_document(
      doc! {
        "eduPersonPrincipalName": EPPN,
        "nin": nin.to_document(),
        "state": "2c84fedd-a694-46f0-b235-7c4dd7982852",
        "nonce": "bbca50f6-5213-4784-b6e6-289bd1debda5",
        "token": "de5b3f2a-14e9-49b8-9c78-a15fcf60d119",
      },
      UnknownFieldPolicy::Reject,
    )
    .unwrap();

    let d = state.to_document();
    assert_eq!(
      keys(&d),
      BTreeSet::from([
        "_id",
        "nin",
        "eduPersonPrincipalName",
        "state",
        "nonce",
        "token",
      ])
    );
    assert_eq!(
      keys(d.get_document("nin").unwrap()),
      BTreeSet::from(["created_by", "created_ts", "number", "verified"])
    );
  }

  #[test]
  fn oidc_new_generates_distinct_correlation_values() {
    let nin =
      NinProofingElement::new("190101021234", "oidc", Timestamp::Now, None)
        .unwrap();
    let state = OidcProofingState::new(EPPN, nin);
    assert_eq!(state.eppn(), EPPN);
    assert!(Uuid::parse_str(state.state()).is_ok());
    assert_ne!(state.state(), state.nonce());
    assert_ne!(state.nonce(), state.token());
  }

  #[test]
  fn state_roundtrips_through_document() {
    let nin = NinProofingElement::new(
      "200102034567",
      "letter",
      Timestamp::Now,
      Some("abc123".into()),
    )
    .unwrap();
    let mut state = LetterProofingState::new(EPPN, nin);
    let letter = state.proofing_letter_mut();
    letter.set_is_sent(true);
    letter.set_sent_ts(Timestamp::Now);
    letter.set_transaction_id("tx-1");

    let d = state.to_document();
    let back =
      LetterProofingState::from_document(d.clone(), UnknownFieldPolicy::Reject)
        .unwrap();
    assert_eq!(back, state);
    assert_eq!(back.to_document(), d);
    assert_eq!(back.proofing_letter().transaction_id(), Some("tx-1"));
  }

  #[test]
  fn missing_eppn_or_nin_fails() {
    let err = LetterProofingState::from_document(
      doc! { "nin": { "number": "1" } },
      UnknownFieldPolicy::Reject,
    )
    .unwrap_err();
    assert!(matches!(
      err,
      Error::MissingRequiredField { field: "eduPersonPrincipalName", .. }
    ));

    let err = OidcProofingState::from_document(
      doc! { "eduPersonPrincipalName": EPPN, "state": "s", "nonce": "n", "token": "t" },
      UnknownFieldPolicy::Reject,
    )
    .unwrap_err();
    assert!(matches!(err, Error::MissingRequiredField { field: "nin", .. }));
  }

  #[test]
  fn primary_flag_of_user_nin_is_dropped() {
    let nin = Nin::new("200102034567", "letter", true, true).unwrap();
    let element =
      NinProofingElement::from_document(nin.to_document(), UnknownFieldPolicy::Reject)
        .unwrap();
    assert_eq!(element.number(), "200102034567");
    assert!(!element.to_document().contains_key("primary"));
    assert!(element.passthrough().is_empty());
  }

  #[test]
  fn nin_number_is_lowercased() {
    let mut nin =
      NinProofingElement::new("19010102123X", "test", Timestamp::Now, None)
        .unwrap();
    assert_eq!(nin.number(), "19010102123x");
    nin.set_number("ABC");
    assert_eq!(nin.key(), "abc");
  }

  #[test]
  fn nested_unknown_fields_follow_policy() {
    let d = doc! {
      "eduPersonPrincipalName": EPPN,
      "nin": { "number": "1", "verified": false, "legacy": 1 },
    };
    assert!(matches!(
      LetterProofingState::from_document(d.clone(), UnknownFieldPolicy::Reject)
        .unwrap_err(),
      Error::UnknownField { .. }
    ));
    let state =
      LetterProofingState::from_document(d, UnknownFieldPolicy::Passthrough)
        .unwrap();
    assert_eq!(state.nin().passthrough(), &doc! { "legacy": 1 });
  }
}
