//! Terms-of-Use acceptance events.

use bson::{Document, doc, oid::ObjectId};

use crate::{
  Error, Result,
  document::{Fields, Timestamp, UnknownFieldPolicy, merge_passthrough},
  element::{DocumentRecord, KeyedElement},
  event::{Event, EventList, EventRegistry},
  list::ElementInput,
};

/// ToU versions every user accepted before acceptance was tracked per user.
pub const LEGACY_TOU_VERSIONS: [&str; 2] = ["2014-v1", "2014-dev-v1"];

/// A user's acceptance of one version of the Terms of Use.
///
/// Unlike a bare [`Event`], `created_by` and `created_ts` must be present and
/// non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ToUEvent {
  event:   Event,
  version: String,
}

impl ToUEvent {
  pub const EVENT_TYPE: &'static str = "tou_event";

  /// Record acceptance of `version` by way of `application`.
  pub fn new(
    version: impl Into<String>,
    application: impl Into<String>,
    created_ts: Timestamp,
    event_id: Option<ObjectId>,
  ) -> Result<Self> {
    let mut doc = doc! {
      "version": version.into(),
      "created_by": application.into(),
      "created_ts": created_ts.to_bson(),
      "event_type": Self::EVENT_TYPE,
    };
    if let Some(id) = event_id {
      doc.insert("id", id);
    }
    Self::from_document(doc, UnknownFieldPolicy::Reject)
  }

  pub fn version(&self) -> &str { &self.version }

  pub fn set_version(&mut self, value: impl Into<String>) {
    self.version = value.into();
  }

  pub fn event(&self) -> &Event { &self.event }
}

impl DocumentRecord for ToUEvent {
  const KIND: &'static str = "tou_event";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut event = Event::read(&mut fields, Some(Self::EVENT_TYPE))?;
    if event.element().created_by().is_none_or(str::is_empty) {
      return Err(Error::missing(Self::KIND, "created_by"));
    }
    if event.element().created_ts().is_none() {
      return Err(Error::missing(Self::KIND, "created_ts"));
    }
    let version = fields.require_str("version")?;
    event.element_mut().set_passthrough(fields.finish(policy)?);
    Ok(Self { event, version })
  }

  fn to_document(&self) -> Document {
    let mut doc = Document::new();
    self.event.write(&mut doc);
    doc.insert("version", self.version.clone());
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.event.element().passthrough() }
}

impl KeyedElement for ToUEvent {
  type Key = ObjectId;

  fn key(&self) -> &ObjectId { self.event.id() }
}

// ─── ToUList ─────────────────────────────────────────────────────────────────

/// The ToU versions a user has accepted, one event per version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToUList {
  events: EventList<ToUEvent>,
}

impl ToUList {
  pub fn registry() -> Result<EventRegistry<ToUEvent>> {
    let mut registry = EventRegistry::<ToUEvent>::new();
    registry.register(ToUEvent::EVENT_TYPE, ToUEvent::from_document)?;
    Ok(registry)
  }

  pub fn new<I>(items: I, policy: UnknownFieldPolicy) -> Result<Self>
  where
    I: IntoIterator<Item = ElementInput<ToUEvent>>,
  {
    Ok(Self {
      events: EventList::new(items, &Self::registry()?, policy)?,
    })
  }

  pub fn from_documents<I>(docs: I, policy: UnknownFieldPolicy) -> Result<Self>
  where
    I: IntoIterator<Item = Document>,
  {
    Self::new(docs.into_iter().map(ElementInput::Raw), policy)
  }

  /// Whether the user has accepted `version`. The legacy versions count as
  /// accepted for everyone.
  pub fn has_accepted(&self, version: &str) -> bool {
    LEGACY_TOU_VERSIONS.contains(&version)
      || self.events.iter().any(|e| e.version() == version)
  }

  /// Record an acceptance. Fails with [`Error::DuplicateKey`] if the event
  /// `id` or its `version` is already in the list.
  pub fn add(&mut self, event: ToUEvent) -> Result<()> {
    if self.events.iter().any(|e| e.version() == event.version()) {
      return Err(Error::DuplicateKey {
        kind: "tou version",
        key:  event.version().to_owned(),
      });
    }
    let version = event.version().to_owned();
    self.events.add(event)?;
    tracing::debug!(%version, "tou accepted");
    Ok(())
  }

  pub fn find(&self, id: &ObjectId) -> Option<&ToUEvent> { self.events.find(id) }

  pub fn remove(&mut self, id: &ObjectId) -> Result<ToUEvent> {
    self.events.remove(id)
  }

  pub fn len(&self) -> usize { self.events.len() }
  pub fn is_empty(&self) -> bool { self.events.is_empty() }
  pub fn iter(&self) -> std::slice::Iter<'_, ToUEvent> { self.events.iter() }
  pub fn events(&self) -> &EventList<ToUEvent> { &self.events }

  /// A new list with the events matching `predicate`, in order.
  pub fn filter<F>(&self, predicate: F) -> Self
  where
    F: FnMut(&ToUEvent) -> bool,
  {
    Self {
      events: self.events.filter(predicate),
    }
  }

  pub fn to_documents(&self) -> Vec<Document> { self.events.to_documents() }

  pub fn to_normalized_documents(&self) -> Vec<Document> {
    self.events.to_normalized_documents()
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::document::datetime_to_bson;

  fn tou(version: &str) -> Document {
    doc! {
      "id": ObjectId::new(),
      "event_type": "tou_event",
      "version": version,
      "created_by": "test",
      "created_ts": datetime_to_bson(
        Utc.with_ymd_and_hms(2015, 9, 24, 3, 3, 3).unwrap(),
      ),
    }
  }

  fn accepted(versions: &[&str]) -> ToUList {
    ToUList::from_documents(
      versions.iter().map(|v| tou(v)),
      UnknownFieldPolicy::Reject,
    )
    .unwrap()
  }

  #[test]
  fn legacy_versions_always_accepted() {
    let empty = accepted(&[]);
    assert!(empty.has_accepted("2014-v1"));
    assert!(empty.has_accepted("2014-dev-v1"));
    assert!(accepted(&["1"]).has_accepted("2014-v1"));
  }

  #[test]
  fn has_accepted_tracks_additions() {
    let mut list = accepted(&["1", "2"]);
    assert!(list.has_accepted("2"));
    assert!(!list.has_accepted("9.9"));

    list
      .add(ToUEvent::new("9.9", "dashboard", Timestamp::Now, None).unwrap())
      .unwrap();
    assert!(list.has_accepted("9.9"));
  }

  #[test]
  fn add_rejects_repeated_version() {
    let mut list = accepted(&["1"]);
    let err = list
      .add(ToUEvent::new("1", "dashboard", Timestamp::Now, None).unwrap())
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { kind: "tou version", .. }));
    assert_eq!(list.len(), 1);
  }

  #[test]
  fn filter_and_normalize_forward_to_events() {
    let mut d = tou("2");
    d.insert("legacy", 1);
    let list = ToUList::from_documents(
      [tou("1"), d, tou("3")],
      UnknownFieldPolicy::Passthrough,
    )
    .unwrap();

    let later = list.filter(|e| e.version() != "1");
    assert_eq!(later.len(), 2);
    assert!(!later.has_accepted("1"));
    assert!(later.has_accepted("3"));

    let docs = list.to_normalized_documents();
    assert_eq!(docs.len(), 3);
    assert!(!docs[1].contains_key("legacy"));
    assert!(list.to_documents()[1].contains_key("legacy"));
  }

  #[test]
  fn requires_provenance() {
    let mut no_app = tou("1");
    no_app.insert("created_by", "");
    assert!(matches!(
      ToUEvent::from_document(no_app, UnknownFieldPolicy::Reject).unwrap_err(),
      Error::MissingRequiredField { field: "created_by", .. }
    ));

    let mut no_ts = tou("1");
    no_ts.remove("created_ts");
    assert!(matches!(
      ToUEvent::from_document(no_ts, UnknownFieldPolicy::Reject).unwrap_err(),
      Error::MissingRequiredField { field: "created_ts", .. }
    ));

    assert!(ToUEvent::new("1", "", Timestamp::Now, None).is_err());
  }

  #[test]
  fn requires_version() {
    let mut d = tou("1");
    d.remove("version");
    assert!(matches!(
      ToUEvent::from_document(d, UnknownFieldPolicy::Reject).unwrap_err(),
      Error::MissingRequiredField { field: "version", .. }
    ));
  }

  #[test]
  fn wrong_event_type_is_invalid() {
    let mut d = tou("1");
    d.insert("event_type", "other_event");
    assert!(matches!(
      ToUEvent::from_document(d, UnknownFieldPolicy::Reject).unwrap_err(),
      Error::InvalidValue { field: "event_type", .. }
    ));
  }

  #[test]
  fn explicit_fields_roundtrip() {
    let id = ObjectId::new();
    let ts = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
    let event =
      ToUEvent::new("2016-v1", "signup", Timestamp::Explicit(ts), Some(id))
        .unwrap();
    let doc = event.to_document();
    assert_eq!(
      doc,
      doc! {
        "id": id,
        "event_type": "tou_event",
        "created_by": "signup",
        "created_ts": datetime_to_bson(ts),
        "version": "2016-v1",
      }
    );
    assert_eq!(
      ToUEvent::from_document(doc, UnknownFieldPolicy::Reject).unwrap(),
      event
    );
  }

  #[test]
  fn now_timestamp_is_stable_after_second_roundtrip() {
    let event = ToUEvent::new("1", "signup", Timestamp::Now, None).unwrap();
    let once = event.to_document();
    let twice = ToUEvent::from_document(once.clone(), UnknownFieldPolicy::Reject)
      .unwrap()
      .to_document();
    assert_eq!(once, twice);
  }
}
