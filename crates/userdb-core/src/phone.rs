//! Phone numbers, a primary element keyed by the number itself.

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

/// A user's phone number.
///
/// Document shape: `{phone, verified, primary, created_by, created_ts,
/// verified_by, verified_ts}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneNumber {
  base:   PrimaryElement,
  number: String,
}

/// The user's phone numbers, at most one of them primary.
pub type PhoneNumberList = PrimaryElementList<PhoneNumber>;

impl PhoneNumber {
  /// Build a phone number from explicit fields; runs the same validation as
  /// [`DocumentRecord::from_document`].
  pub fn new(
    number: impl Into<String>,
    application: impl Into<String>,
    verified: bool,
    primary: bool,
  ) -> Result<Self> {
    Self::from_document(
      doc! {
        "phone": number.into(),
        "created_by": application.into(),
        "created_ts": Timestamp::Now.to_bson(),
        "verified": verified,
        "primary": primary,
      },
      UnknownFieldPolicy::Reject,
    )
  }

  /// The number, lower-cased.
  pub fn number(&self) -> &str { &self.number }

  pub fn set_number(&mut self, value: impl AsRef<str>) {
    self.number = normalize_key(value.as_ref());
  }

  pub fn base(&self) -> &PrimaryElement { &self.base }

  pub fn verification(&self) -> &VerifiedElement { self.base.verification() }
  pub fn verification_mut(&mut self) -> &mut VerifiedElement {
    self.base.verification_mut()
  }

  pub fn element(&self) -> &Element { self.base.element() }
}

impl DocumentRecord for PhoneNumber {
  const KIND: &'static str = "phone";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut base = PrimaryElement::read(&mut fields)?;
    let number = normalize_key(&fields.require_str("phone")?);
    base.element_mut().set_passthrough(fields.finish(policy)?);
    Ok(Self { base, number })
  }

  fn to_document(&self) -> Document {
    let mut doc = doc! { "phone": self.number.clone() };
    self.base.write(&mut doc);
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.base.element().passthrough() }
}

impl KeyedElement for PhoneNumber {
  type Key = String;

  fn key(&self) -> &String { &self.number }
}

impl HasPrimary for PhoneNumber {
  fn primary_element(&self) -> &PrimaryElement { &self.base }
  fn primary_element_mut(&mut self) -> &mut PrimaryElement { &mut self.base }
}

#[cfg(test)]
mod tests {
  use bson::{Bson, doc};
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::{Error, document::datetime_to_bson, list::ElementInput};

  fn ts() -> Bson {
    datetime_to_bson(Utc.with_ymd_and_hms(2013, 9, 2, 10, 23, 25).unwrap())
  }

  fn phone(number: &str, verified: bool, primary: bool) -> Document {
    doc! {
      "phone": number,
      "verified": verified,
      "primary": primary,
      "created_by": "test",
      "created_ts": ts(),
    }
  }

  fn list_of(docs: Vec<Document>) -> Result<PhoneNumberList> {
    PhoneNumberList::from_documents(docs, UnknownFieldPolicy::Reject)
  }

  fn primary_count(list: &PhoneNumberList) -> usize {
    list.iter().filter(|p| p.is_primary()).count()
  }

  // ─── Element ───────────────────────────────────────────────────────────────

  #[test]
  fn document_roundtrip() {
    let mut input = phone("+46700011336", true, true);
    input.insert("verified_by", "dashboard");
    input.insert("verified_ts", ts());
    let parsed =
      PhoneNumber::from_document(input.clone(), UnknownFieldPolicy::Reject)
        .unwrap();
    assert_eq!(parsed.to_document(), input);
  }

  #[test]
  fn number_is_lowercased() {
    let p = PhoneNumber::from_document(
      phone("+46700011336X", true, false),
      UnknownFieldPolicy::Reject,
    )
    .unwrap();
    assert_eq!(p.number(), "+46700011336x");
    assert_eq!(p.key(), "+46700011336x");
  }

  #[test]
  fn non_string_number_is_invalid() {
    let mut d = phone("x", false, false);
    d.insert("phone", 46_700_011_336_i64);
    let err =
      PhoneNumber::from_document(d, UnknownFieldPolicy::Reject).unwrap_err();
    assert!(matches!(err, Error::InvalidValue { field: "phone", .. }));
  }

  #[test]
  fn unknown_field_policy() {
    let mut d = phone("+46700011336", true, true);
    d.insert("foo", "bar");

    let err = PhoneNumber::from_document(d.clone(), UnknownFieldPolicy::Reject)
      .unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }));

    let p =
      PhoneNumber::from_document(d.clone(), UnknownFieldPolicy::Passthrough)
        .unwrap();
    assert_eq!(p.to_document(), d);
    assert!(!p.to_normalized_document().contains_key("foo"));
  }

  #[test]
  fn new_builds_verified_primary() {
    let p = PhoneNumber::new("+46700011336", "signup", true, true).unwrap();
    assert!(p.is_primary());
    assert_eq!(p.element().created_by(), Some("signup"));
    assert!(p.element().created_ts().is_some());
    assert!(PhoneNumber::new("+46700011337", "signup", false, true).is_err());
  }

  // ─── List construction ─────────────────────────────────────────────────────

  #[test]
  fn empty_list_has_no_primary() {
    let list = list_of(vec![]).unwrap();
    assert!(list.primary().unwrap().is_none());
  }

  #[test]
  fn construction_requires_exactly_one_primary() {
    let none = list_of(vec![phone("+1", true, false), phone("+2", true, false)]);
    assert!(matches!(
      none.unwrap_err(),
      Error::PrimaryInvariantViolation { .. }
    ));

    let two = list_of(vec![phone("+1", true, true), phone("+2", true, true)]);
    assert!(matches!(
      two.unwrap_err(),
      Error::PrimaryInvariantViolation { .. }
    ));

    let one =
      list_of(vec![phone("+1", true, false), phone("+2", true, true)]).unwrap();
    assert_eq!(one.primary().unwrap().unwrap().number(), "+2");
  }

  #[test]
  fn construction_rejects_duplicates() {
    let err = list_of(vec![phone("+1", true, true), phone("+1", false, false)])
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { .. }));
  }

  #[test]
  fn construction_accepts_built_elements() {
    let built = PhoneNumber::new("+2", "test", true, false).unwrap();
    let list = PhoneNumberList::from_inputs(
      vec![
        ElementInput::Raw(phone("+1", true, true)),
        ElementInput::Built(built.clone()),
      ],
      UnknownFieldPolicy::Reject,
    )
    .unwrap();
    assert_eq!(list.find("+2"), Some(&built));
  }

  #[test]
  fn order_is_preserved() {
    let docs = vec![
      phone("+3", true, false),
      phone("+1", true, true),
      phone("+2", false, false),
    ];
    let list = list_of(docs.clone()).unwrap();
    assert_eq!(list.to_documents(), docs);
  }

  // ─── Mutation ──────────────────────────────────────────────────────────────

  #[test]
  fn set_primary_flips_all_flags() {
    let mut list = list_of(vec![
      phone("+1", true, true),
      phone("+2", true, false),
      phone("+3", true, false),
    ])
    .unwrap();

    list.set_primary("+3").unwrap();
    assert_eq!(primary_count(&list), 1);
    assert_eq!(list.primary().unwrap().unwrap().number(), "+3");
    assert!(!list.find("+1").unwrap().is_primary());
  }

  #[test]
  fn set_primary_unknown_or_unverified_fails_cleanly() {
    let mut list =
      list_of(vec![phone("+1", true, true), phone("+2", false, false)]).unwrap();
    let before = list.clone();

    assert!(matches!(
      list.set_primary("+9").unwrap_err(),
      Error::UnknownKey { .. }
    ));
    assert!(matches!(
      list.set_primary("+2").unwrap_err(),
      Error::PrimaryInvariantViolation { .. }
    ));
    assert_eq!(list, before);
  }

  #[test]
  fn add_then_find() {
    let mut list = list_of(vec![phone("+1", true, true)]).unwrap();
    let added = PhoneNumber::new("+2", "test", false, false).unwrap();
    list.add(added.clone()).unwrap();
    assert_eq!(list.find("+2"), Some(&added));
    assert_eq!(primary_count(&list), 1);
  }

  #[test]
  fn add_duplicate_leaves_list_unchanged() {
    let mut list = list_of(vec![phone("+1", true, true)]).unwrap();
    let before = list.clone();
    let dup = PhoneNumber::new("+1", "other", true, false).unwrap();
    assert!(matches!(list.add(dup).unwrap_err(), Error::DuplicateKey { .. }));
    assert_eq!(list, before);
  }

  #[test]
  fn add_to_empty_list_promotes_verified_element() {
    let mut list = PhoneNumberList::new();
    list
      .add(PhoneNumber::new("+1", "test", true, false).unwrap())
      .unwrap();
    assert_eq!(list.primary().unwrap().unwrap().number(), "+1");
  }

  #[test]
  fn add_unverified_to_empty_list_fails() {
    let mut list = PhoneNumberList::new();
    let err = list
      .add(PhoneNumber::new("+1", "test", false, false).unwrap())
      .unwrap_err();
    assert!(matches!(err, Error::PrimaryInvariantViolation { .. }));
    assert!(list.is_empty());
  }

  #[test]
  fn add_second_primary_fails() {
    let mut list = list_of(vec![phone("+1", true, true)]).unwrap();
    let err = list
      .add(PhoneNumber::new("+2", "test", true, true).unwrap())
      .unwrap_err();
    assert!(matches!(err, Error::PrimaryInvariantViolation { .. }));
    assert_eq!(list.len(), 1);
  }

  #[test]
  fn remove_unknown_leaves_list_unchanged() {
    let mut list = list_of(vec![phone("+1", true, true)]).unwrap();
    let before = list.clone();
    assert!(matches!(
      list.remove("+46709999999").unwrap_err(),
      Error::UnknownKey { .. }
    ));
    assert_eq!(list, before);
  }

  #[test]
  fn remove_primary_only_when_last() {
    let mut list =
      list_of(vec![phone("+1", true, true), phone("+2", true, false)]).unwrap();
    assert!(matches!(
      list.remove("+1").unwrap_err(),
      Error::PrimaryInvariantViolation { .. }
    ));

    let removed = list.remove("+2").unwrap();
    assert_eq!(removed.number(), "+2");
    assert_eq!(primary_count(&list), 1);

    list.remove("+1").unwrap();
    assert!(list.is_empty());
  }

  #[test]
  fn update_keeps_single_primary() {
    let mut list =
      list_of(vec![phone("+1", true, true), phone("+2", true, false)]).unwrap();

    let err = list
      .update("+2", |p| p.base.set_primary(true))
      .unwrap_err();
    assert!(matches!(err, Error::PrimaryInvariantViolation { .. }));
    assert!(!list.find("+2").unwrap().is_primary());

    list
      .update("+2", |p| {
        p.verification_mut().set_verified_by("dashboard");
        Ok(())
      })
      .unwrap();
    assert_eq!(
      list.find("+2").unwrap().verification().verified_by(),
      Some("dashboard")
    );
  }

  #[test]
  fn update_rejects_key_collision() {
    let mut list =
      list_of(vec![phone("+1", true, true), phone("+2", true, false)]).unwrap();
    let err = list
      .update("+2", |p| {
        p.set_number("+1");
        Ok(())
      })
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { .. }));
    assert!(list.find("+2").is_some());
  }

  #[test]
  fn unverifying_primary_is_allowed() {
    let mut list = list_of(vec![phone("+1", true, true)]).unwrap();
    list
      .update("+1", |p| {
        p.verification_mut().set_verified(false);
        Ok(())
      })
      .unwrap();
    assert!(!list.find("+1").unwrap().is_verified());
    assert!(list.primary().unwrap().is_some());
  }

  #[test]
  fn filter_returns_plain_list_in_order() {
    let list = list_of(vec![
      phone("+1", true, true),
      phone("+2", false, false),
      phone("+3", true, false),
    ])
    .unwrap();
    let verified = list.filter(|p| p.is_verified());
    let numbers: Vec<_> = verified.iter().map(PhoneNumber::number).collect();
    assert_eq!(numbers, ["+1", "+3"]);
  }
}
