//! Ordered, key-unique element lists.
//!
//! All mutating operations work in place and are all-or-nothing: on error the
//! list is left exactly as it was. [`ElementList::filter`] is the only
//! operation that produces a new list.

use std::borrow::Borrow;

use bson::Document;

use crate::{
  Error, Result,
  document::UnknownFieldPolicy,
  element::{HasPrimary, KeyedElement},
};

// ─── Input ───────────────────────────────────────────────────────────────────

/// One item of list input: a stored document still to be validated, or an
/// element that has already been built.
#[derive(Debug, Clone)]
pub enum ElementInput<E> {
  Raw(Document),
  Built(E),
}

impl<E> From<Document> for ElementInput<E> {
  fn from(doc: Document) -> Self { Self::Raw(doc) }
}

// ─── ElementList ─────────────────────────────────────────────────────────────

/// An ordered list of elements with unique keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementList<E> {
  elements: Vec<E>,
}

impl<E> Default for ElementList<E> {
  fn default() -> Self {
    Self {
      elements: Vec::new(),
    }
  }
}

impl<E: KeyedElement> ElementList<E> {
  pub fn new() -> Self { Self::default() }

  /// Build a list, validating raw documents with `E::from_document`.
  pub fn from_inputs<I>(items: I, policy: UnknownFieldPolicy) -> Result<Self>
  where
    I: IntoIterator<Item = ElementInput<E>>,
  {
    Self::from_inputs_with(items, |doc| E::from_document(doc, policy))
  }

  pub fn from_documents<I>(docs: I, policy: UnknownFieldPolicy) -> Result<Self>
  where
    I: IntoIterator<Item = Document>,
  {
    Self::from_inputs(docs.into_iter().map(ElementInput::Raw), policy)
  }

  pub fn from_elements<I>(elements: I) -> Result<Self>
  where
    I: IntoIterator<Item = E>,
  {
    let mut list = Self::new();
    for element in elements {
      list.add(element)?;
    }
    Ok(list)
  }

  /// Build a list, resolving raw documents with `build`.
  pub(crate) fn from_inputs_with<I, F>(items: I, mut build: F) -> Result<Self>
  where
    I: IntoIterator<Item = ElementInput<E>>,
    F: FnMut(Document) -> Result<E>,
  {
    let mut list = Self::new();
    for item in items {
      let element = match item {
        ElementInput::Raw(doc) => build(doc)?,
        ElementInput::Built(element) => element,
      };
      list.add(element)?;
    }
    Ok(list)
  }

  pub fn len(&self) -> usize { self.elements.len() }
  pub fn is_empty(&self) -> bool { self.elements.is_empty() }
  pub fn iter(&self) -> std::slice::Iter<'_, E> { self.elements.iter() }
  pub fn to_list(&self) -> &[E] { &self.elements }

  fn position<Q>(&self, key: &Q) -> Option<usize>
  where
    E::Key: Borrow<Q>,
    Q: Eq + ?Sized,
  {
    self.elements.iter().position(|e| e.key().borrow() == key)
  }

  pub fn find<Q>(&self, key: &Q) -> Option<&E>
  where
    E::Key: Borrow<Q>,
    Q: Eq + ?Sized,
  {
    self.position(key).map(|idx| &self.elements[idx])
  }

  pub fn contains<Q>(&self, key: &Q) -> bool
  where
    E::Key: Borrow<Q>,
    Q: Eq + ?Sized,
  {
    self.position(key).is_some()
  }

  /// Append `element`. Fails with [`Error::DuplicateKey`] if its key is
  /// already present.
  pub fn add(&mut self, element: E) -> Result<()> {
    if self.contains(element.key()) {
      return Err(Error::DuplicateKey {
        kind: E::KIND,
        key:  element.key().to_string(),
      });
    }
    self.elements.push(element);
    Ok(())
  }

  /// Remove and return the element with `key`.
  pub fn remove<Q>(&mut self, key: &Q) -> Result<E>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
  {
    let idx = self.index_of(key)?;
    Ok(self.elements.remove(idx))
  }

  /// Apply `f` to a copy of the element with `key` and commit it if the
  /// result still has a unique key.
  pub fn update<Q, F>(&mut self, key: &Q, f: F) -> Result<()>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
    F: FnOnce(&mut E) -> Result<()>,
  {
    let (idx, candidate) = self.prepare_update(key, f)?;
    self.commit(idx, candidate);
    Ok(())
  }

  /// A new list with the elements matching `predicate`, in order.
  pub fn filter<F>(&self, mut predicate: F) -> Self
  where
    F: FnMut(&E) -> bool,
  {
    Self {
      elements: self
        .elements
        .iter()
        .filter(|e| predicate(*e))
        .cloned()
        .collect(),
    }
  }

  /// Serialise every element, passthrough fields included.
  pub fn to_documents(&self) -> Vec<Document> {
    self.elements.iter().map(E::to_document).collect()
  }

  /// Serialise only the recognised fields of every element.
  pub fn to_normalized_documents(&self) -> Vec<Document> {
    self
      .elements
      .iter()
      .map(E::to_normalized_document)
      .collect()
  }

  fn index_of<Q>(&self, key: &Q) -> Result<usize>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
  {
    self.position(key).ok_or_else(|| Error::UnknownKey {
      kind: E::KIND,
      key:  key.to_string(),
    })
  }

  pub(crate) fn prepare_update<Q, F>(&self, key: &Q, f: F) -> Result<(usize, E)>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
    F: FnOnce(&mut E) -> Result<()>,
  {
    let idx = self.index_of(key)?;
    let mut candidate = self.elements[idx].clone();
    f(&mut candidate)?;
    if let Some(other) = self.position::<E::Key>(candidate.key())
      && other != idx
    {
      return Err(Error::DuplicateKey {
        kind: E::KIND,
        key:  candidate.key().to_string(),
      });
    }
    Ok((idx, candidate))
  }

  pub(crate) fn commit(&mut self, idx: usize, element: E) {
    self.elements[idx] = element;
  }

  pub(crate) fn as_mut_slice(&mut self) -> &mut [E] { &mut self.elements }
}

impl<'a, E> IntoIterator for &'a ElementList<E> {
  type Item = &'a E;
  type IntoIter = std::slice::Iter<'a, E>;

  fn into_iter(self) -> Self::IntoIter { self.elements.iter() }
}

// ─── PrimaryElementList ──────────────────────────────────────────────────────

/// An element list in which, unless the list is empty, exactly one element
/// is flagged primary.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryElementList<E> {
  list: ElementList<E>,
}

impl<E> Default for PrimaryElementList<E> {
  fn default() -> Self {
    Self {
      list: ElementList::default(),
    }
  }
}

impl<E: HasPrimary> PrimaryElementList<E> {
  pub fn new() -> Self { Self::default() }

  pub fn from_inputs<I>(items: I, policy: UnknownFieldPolicy) -> Result<Self>
  where
    I: IntoIterator<Item = ElementInput<E>>,
  {
    Self::checked(ElementList::from_inputs(items, policy)?)
  }

  pub fn from_documents<I>(docs: I, policy: UnknownFieldPolicy) -> Result<Self>
  where
    I: IntoIterator<Item = Document>,
  {
    Self::checked(ElementList::from_documents(docs, policy)?)
  }

  pub fn from_elements<I>(elements: I) -> Result<Self>
  where
    I: IntoIterator<Item = E>,
  {
    Self::checked(ElementList::from_elements(elements)?)
  }

  fn checked(list: ElementList<E>) -> Result<Self> {
    primary_index(list.to_list())?;
    Ok(Self { list })
  }

  pub fn len(&self) -> usize { self.list.len() }
  pub fn is_empty(&self) -> bool { self.list.is_empty() }
  pub fn iter(&self) -> std::slice::Iter<'_, E> { self.list.iter() }
  pub fn to_list(&self) -> &[E] { self.list.to_list() }
  pub fn as_list(&self) -> &ElementList<E> { &self.list }

  pub fn find<Q>(&self, key: &Q) -> Option<&E>
  where
    E::Key: Borrow<Q>,
    Q: Eq + ?Sized,
  {
    self.list.find(key)
  }

  /// The primary element, or `None` if the list is empty.
  pub fn primary(&self) -> Result<Option<&E>> {
    Ok(primary_index(self.list.to_list())?.map(|idx| &self.list.to_list()[idx]))
  }

  /// Make the element with `key` the only primary element.
  ///
  /// The new assignment is validated before any flag is written.
  pub fn set_primary<Q>(&mut self, key: &Q) -> Result<()>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
  {
    let idx = self.list.index_of(key)?;
    if !self.list.to_list()[idx].is_verified() {
      return Err(Error::primary(E::KIND, "primary element must be verified"));
    }
    for (i, element) in self.list.as_mut_slice().iter_mut().enumerate() {
      element.primary_element_mut().mark_primary(i == idx);
    }
    tracing::debug!(kind = E::KIND, key = %key, "primary element changed");
    Ok(())
  }

  /// Append `element`.
  ///
  /// The first element of an empty list becomes primary if it is verified;
  /// an unverified first element is rejected. A primary element cannot be
  /// added to a non-empty list, use [`Self::set_primary`] after adding it.
  pub fn add(&mut self, mut element: E) -> Result<()> {
    if self.list.contains(element.key()) {
      return Err(Error::DuplicateKey {
        kind: E::KIND,
        key:  element.key().to_string(),
      });
    }
    if self.list.is_empty() {
      if !element.is_verified() {
        return Err(Error::primary(
          E::KIND,
          "first element must be verified to become primary",
        ));
      }
      if !element.is_primary() {
        tracing::debug!(kind = E::KIND, key = %element.key(), "promoting first element to primary");
        element.primary_element_mut().mark_primary(true);
      }
    } else if element.is_primary() {
      return Err(Error::primary(E::KIND, "list already has a primary element"));
    }
    self.list.add(element)
  }

  /// Remove and return the element with `key`. The primary element can only
  /// be removed when it is the last element.
  pub fn remove<Q>(&mut self, key: &Q) -> Result<E>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
  {
    let idx = self.list.index_of(key)?;
    if self.list.len() > 1 && self.list.to_list()[idx].is_primary() {
      return Err(Error::primary(
        E::KIND,
        "cannot remove the primary element while others remain",
      ));
    }
    self.list.remove(key)
  }

  /// Apply `f` to a copy of the element with `key`; committed only if the
  /// list still has exactly one primary element.
  pub fn update<Q, F>(&mut self, key: &Q, f: F) -> Result<()>
  where
    E::Key: Borrow<Q>,
    Q: Eq + std::fmt::Display + ?Sized,
    F: FnOnce(&mut E) -> Result<()>,
  {
    let (idx, candidate) = self.list.prepare_update(key, f)?;
    let others = self
      .list
      .iter()
      .enumerate()
      .filter(|(i, e)| *i != idx && e.is_primary())
      .count();
    match others + usize::from(candidate.is_primary()) {
      1 => {
        self.list.commit(idx, candidate);
        Ok(())
      }
      0 => Err(Error::primary(E::KIND, "no primary element")),
      _ => Err(Error::primary(E::KIND, "more than one primary element")),
    }
  }

  /// A plain list of the matching elements; the result carries no primary
  /// invariant.
  pub fn filter<F>(&self, predicate: F) -> ElementList<E>
  where
    F: FnMut(&E) -> bool,
  {
    self.list.filter(predicate)
  }

  pub fn to_documents(&self) -> Vec<Document> { self.list.to_documents() }

  pub fn to_normalized_documents(&self) -> Vec<Document> {
    self.list.to_normalized_documents()
  }
}

impl<'a, E> IntoIterator for &'a PrimaryElementList<E> {
  type Item = &'a E;
  type IntoIter = std::slice::Iter<'a, E>;

  fn into_iter(self) -> Self::IntoIter { self.list.elements.iter() }
}

/// Index of the single primary element; `None` for an empty slice.
fn primary_index<E: HasPrimary>(elements: &[E]) -> Result<Option<usize>> {
  if elements.is_empty() {
    return Ok(None);
  }
  let mut primaries = elements
    .iter()
    .enumerate()
    .filter(|(_, e)| e.is_primary())
    .map(|(idx, _)| idx);
  match (primaries.next(), primaries.next()) {
    (Some(idx), None) => Ok(Some(idx)),
    (None, _) => Err(Error::primary(E::KIND, "no primary element")),
    (Some(_), Some(_)) => {
      Err(Error::primary(E::KIND, "more than one primary element"))
    }
  }
}
