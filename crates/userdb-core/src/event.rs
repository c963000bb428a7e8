//! Events: timestamped records of something that happened to a user.
//!
//! Raw event documents are dispatched to their concrete type through an
//! [`EventRegistry`] keyed by the `event_type` discriminator.

use std::collections::BTreeMap;

use bson::{Bson, Document, oid::ObjectId};

use crate::{
  Error, Result,
  document::{Fields, UnknownFieldPolicy, merge_passthrough},
  element::{DocumentRecord, Element, KeyedElement},
  list::{ElementInput, ElementList},
  tou::ToUEvent,
};

// ─── Event ───────────────────────────────────────────────────────────────────

/// The fields shared by every event: `{id, event_type, created_by,
/// created_ts}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
  id:         ObjectId,
  event_type: String,
  element:    Element,
}

impl Event {
  /// Read the common event fields. When `expected` is given, an absent
  /// `event_type` defaults to it and any other value is rejected.
  pub(crate) fn read(
    fields: &mut Fields,
    expected: Option<&'static str>,
  ) -> Result<Self> {
    let id = fields.take_object_id("id")?.unwrap_or_else(ObjectId::new);
    let event_type = match (fields.take_str("event_type")?, expected) {
      (Some(found), Some(want)) if found != want => {
        return Err(Error::invalid(fields.kind(), "event_type", found));
      }
      (Some(found), _) => found,
      (None, Some(want)) => want.to_owned(),
      (None, None) => return Err(Error::missing(fields.kind(), "event_type")),
    };
    Ok(Self {
      id,
      event_type,
      element: Element::read(fields)?,
    })
  }

  pub(crate) fn write(&self, doc: &mut Document) {
    doc.insert("id", self.id);
    doc.insert("event_type", self.event_type.clone());
    self.element.write(doc);
  }

  pub fn id(&self) -> &ObjectId { &self.id }
  pub fn event_type(&self) -> &str { &self.event_type }

  pub fn element(&self) -> &Element { &self.element }
  pub fn element_mut(&mut self) -> &mut Element { &mut self.element }
}

impl DocumentRecord for Event {
  const KIND: &'static str = "event";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    let mut fields = Fields::new(Self::KIND, doc);
    let mut event = Self::read(&mut fields, None)?;
    event.element.set_passthrough(fields.finish(policy)?);
    Ok(event)
  }

  fn to_document(&self) -> Document {
    let mut doc = Document::new();
    self.write(&mut doc);
    merge_passthrough(&mut doc, self.passthrough());
    doc
  }

  fn passthrough(&self) -> &Document { self.element.passthrough() }
}

impl KeyedElement for Event {
  type Key = ObjectId;

  fn key(&self) -> &ObjectId { &self.id }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Builds a concrete event from an owned document.
pub type EventFactory<E> = fn(Document, UnknownFieldPolicy) -> Result<E>;

/// Maps `event_type` discriminators to the factory for that event type.
#[derive(Debug, Clone)]
pub struct EventRegistry<E> {
  factories: BTreeMap<&'static str, EventFactory<E>>,
}

impl<E> Default for EventRegistry<E> {
  fn default() -> Self {
    Self {
      factories: BTreeMap::new(),
    }
  }
}

impl<E> EventRegistry<E> {
  pub fn new() -> Self { Self::default() }

  /// Register `factory` for `event_type`. Each discriminator may be
  /// registered once.
  pub fn register(
    &mut self,
    event_type: &'static str,
    factory: EventFactory<E>,
  ) -> Result<()> {
    if self.factories.contains_key(event_type) {
      return Err(Error::DuplicateKey {
        kind: "event_type",
        key:  event_type.to_owned(),
      });
    }
    self.factories.insert(event_type, factory);
    Ok(())
  }

  pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.factories.keys().copied()
  }

  /// Build the concrete event for `doc` according to its `event_type`.
  pub fn dispatch(&self, doc: Document, policy: UnknownFieldPolicy) -> Result<E> {
    let event_type = match doc.get("event_type") {
      Some(Bson::String(t)) => t.clone(),
      None | Some(Bson::Null) => {
        return Err(Error::missing(Event::KIND, "event_type"));
      }
      Some(other) => return Err(Error::invalid(Event::KIND, "event_type", other)),
    };
    let factory = self
      .factories
      .get(event_type.as_str())
      .ok_or(Error::UnknownEventType(event_type))?;
    factory(doc, policy)
  }
}

// ─── AnyEvent ────────────────────────────────────────────────────────────────

/// Every known event type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnyEvent {
  ToU(ToUEvent),
}

impl AnyEvent {
  /// A registry with a factory for every known event type.
  pub fn registry() -> Result<EventRegistry<Self>> {
    let mut registry = EventRegistry::<Self>::new();
    registry.register(ToUEvent::EVENT_TYPE, |doc, policy| {
      ToUEvent::from_document(doc, policy).map(Self::ToU)
    })?;
    Ok(registry)
  }

  pub fn event(&self) -> &Event {
    match self {
      Self::ToU(e) => e.event(),
    }
  }

  pub fn as_tou(&self) -> Option<&ToUEvent> {
    match self {
      Self::ToU(e) => Some(e),
    }
  }
}

impl DocumentRecord for AnyEvent {
  const KIND: &'static str = "event";

  fn from_document(doc: Document, policy: UnknownFieldPolicy) -> Result<Self> {
    Self::registry()?.dispatch(doc, policy)
  }

  fn to_document(&self) -> Document {
    match self {
      Self::ToU(e) => e.to_document(),
    }
  }

  fn passthrough(&self) -> &Document {
    match self {
      Self::ToU(e) => e.passthrough(),
    }
  }
}

impl KeyedElement for AnyEvent {
  type Key = ObjectId;

  fn key(&self) -> &ObjectId { self.event().id() }
}

// ─── EventList ───────────────────────────────────────────────────────────────

/// An ordered list of events keyed by event `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventList<E> {
  list: ElementList<E>,
}

impl<E> Default for EventList<E> {
  fn default() -> Self {
    Self {
      list: ElementList::default(),
    }
  }
}

impl<E: KeyedElement<Key = ObjectId>> EventList<E> {
  /// Build a list, dispatching raw documents through `registry`. Fails with
  /// [`Error::UnknownEventType`] on an unregistered `event_type`.
  pub fn new<I>(
    items: I,
    registry: &EventRegistry<E>,
    policy: UnknownFieldPolicy,
  ) -> Result<Self>
  where
    I: IntoIterator<Item = ElementInput<E>>,
  {
    let list =
      ElementList::from_inputs_with(items, |doc| registry.dispatch(doc, policy))?;
    Ok(Self { list })
  }

  pub fn from_documents<I>(
    docs: I,
    registry: &EventRegistry<E>,
    policy: UnknownFieldPolicy,
  ) -> Result<Self>
  where
    I: IntoIterator<Item = Document>,
  {
    Self::new(docs.into_iter().map(ElementInput::Raw), registry, policy)
  }

  pub fn len(&self) -> usize { self.list.len() }
  pub fn is_empty(&self) -> bool { self.list.is_empty() }
  pub fn iter(&self) -> std::slice::Iter<'_, E> { self.list.iter() }
  pub fn to_list(&self) -> &[E] { self.list.to_list() }

  pub fn find(&self, id: &ObjectId) -> Option<&E> { self.list.find(id) }

  /// Append `event`; fails with [`Error::DuplicateKey`] on a repeated `id`.
  pub fn add(&mut self, event: E) -> Result<()> { self.list.add(event) }

  pub fn remove(&mut self, id: &ObjectId) -> Result<E> { self.list.remove(id) }

  pub fn filter<F>(&self, predicate: F) -> Self
  where
    F: FnMut(&E) -> bool,
  {
    Self {
      list: self.list.filter(predicate),
    }
  }

  pub fn to_documents(&self) -> Vec<Document> { self.list.to_documents() }

  pub fn to_normalized_documents(&self) -> Vec<Document> {
    self.list.to_normalized_documents()
  }
}

impl<'a, E> IntoIterator for &'a EventList<E> {
  type Item = &'a E;
  type IntoIter = std::slice::Iter<'a, E>;

  fn into_iter(self) -> Self::IntoIter { (&self.list).into_iter() }
}
