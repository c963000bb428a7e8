//! Typed repositories over a [`DocumentStore`].

use std::marker::PhantomData;

use bson::{Bson, Document, oid::ObjectId};

use crate::{
  Error,
  action::{Action, NewAction},
  document::UnknownFieldPolicy,
  element::DocumentRecord,
  error::StoreError,
  proofing::{OidcProofingState, ProofingState, eppn_query},
  store::DocumentStore,
};

type DbResult<T, S> = Result<T, StoreError<<S as DocumentStore>::Error>>;

fn decode<T: DocumentRecord, E: std::error::Error + 'static>(
  docs: Vec<Document>,
  policy: UnknownFieldPolicy,
) -> Result<Vec<T>, StoreError<E>> {
  docs
    .into_iter()
    .map(|doc| T::from_document(doc, policy).map_err(StoreError::Model))
    .collect()
}

// ─── ActionDb ────────────────────────────────────────────────────────────────

/// The queue of pending login actions.
#[derive(Debug)]
pub struct ActionDb<S> {
  store:  S,
  policy: UnknownFieldPolicy,
}

impl<S: DocumentStore> ActionDb<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      policy: UnknownFieldPolicy::Reject,
    }
  }

  /// Read stored actions with `policy` instead of rejecting unknown fields.
  pub fn with_policy(mut self, policy: UnknownFieldPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub async fn add_action(&self, input: NewAction) -> DbResult<Action, S> {
    let action = Action::from_new(input)?;
    self
      .store
      .insert(action.to_document())
      .await
      .map_err(StoreError::Store)?;
    tracing::debug!(
      action_id = %action.action_id(),
      user_oid = %action.user_id(),
      action = action.action_type(),
      "action added"
    );
    Ok(action)
  }

  /// All actions for a user, most preferred first. Ties are broken by
  /// `_id` so the order is stable.
  pub async fn get_actions(&self, user_oid: &ObjectId) -> DbResult<Vec<Action>, S> {
    let docs = self
      .store
      .get_documents_by_attribute("user_oid", Bson::ObjectId(*user_oid))
      .await
      .map_err(StoreError::Store)?;
    let mut actions: Vec<Action> = decode(docs, self.policy)?;
    actions.sort_by(|a, b| {
      b.preference()
        .cmp(&a.preference())
        .then_with(|| a.action_id().bytes().cmp(&b.action_id().bytes()))
    });
    Ok(actions)
  }

  /// The next action to run in `session`: the most preferred action that is
  /// either unbound or bound to that session.
  pub async fn get_next_action(
    &self,
    user_oid: &ObjectId,
    session: Option<&str>,
  ) -> DbResult<Option<Action>, S> {
    let actions = self.get_actions(user_oid).await?;
    Ok(actions.into_iter().find(|action| {
      action.session().is_empty() || Some(action.session()) == session
    }))
  }

  pub async fn has_actions(&self, user_oid: &ObjectId) -> DbResult<bool, S> {
    Ok(!self.get_actions(user_oid).await?.is_empty())
  }

  /// Returns `false` if the action was already gone.
  pub async fn remove_action(&self, action_id: &ObjectId) -> DbResult<bool, S> {
    let removed = self
      .store
      .remove(*action_id)
      .await
      .map_err(StoreError::Store)?;
    tracing::debug!(%action_id, removed, "action removed");
    Ok(removed)
  }
}

// ─── ProofingStateDb ─────────────────────────────────────────────────────────

/// Proofing states of one flow, at most one per user.
#[derive(Debug)]
pub struct ProofingStateDb<S, T> {
  store:  S,
  policy: UnknownFieldPolicy,
  _state: PhantomData<fn() -> T>,
}

impl<S: DocumentStore, T: ProofingState> ProofingStateDb<S, T> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      policy: UnknownFieldPolicy::Reject,
      _state: PhantomData,
    }
  }

  pub fn with_policy(mut self, policy: UnknownFieldPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  async fn find_one(&self, name: &str, value: Bson) -> DbResult<Option<T>, S> {
    let key = value.to_string();
    let docs = self
      .store
      .get_documents_by_attribute(name, value)
      .await
      .map_err(StoreError::Store)?;
    let mut states: Vec<T> = decode(docs, self.policy)?;
    if states.len() > 1 {
      return Err(StoreError::Model(Error::DuplicateKey { kind: T::KIND, key }));
    }
    Ok(states.pop())
  }

  pub async fn get_state_by_eppn(&self, eppn: &str) -> DbResult<Option<T>, S> {
    let (name, value) = eppn_query(eppn);
    self.find_one(name, value).await
  }

  /// Store `state`, replacing any earlier state for the same user.
  ///
  /// `state` is written before the earlier states are removed, so a failed
  /// write leaves the stored states untouched.
  pub async fn save_state(&self, state: &T) -> DbResult<(), S> {
    let (name, value) = eppn_query(state.eppn());
    let existing = self
      .store
      .get_documents_by_attribute(name, value)
      .await
      .map_err(StoreError::Store)?;

    let mut replaced = false;
    let mut stale = Vec::new();
    for doc in existing {
      match doc.get("_id") {
        Some(Bson::ObjectId(id)) if id == state.id() => replaced = true,
        Some(Bson::ObjectId(id)) => stale.push(*id),
        Some(other) => {
          return Err(StoreError::Model(Error::InvalidValue {
            kind:  T::KIND,
            field: "_id",
            value: other.to_string(),
          }));
        }
        None => {
          return Err(StoreError::Model(Error::MissingRequiredField {
            kind:  T::KIND,
            field: "_id",
          }));
        }
      }
    }

    if replaced {
      self
        .store
        .update(state.to_document())
        .await
        .map_err(StoreError::Store)?;
    } else {
      self
        .store
        .insert(state.to_document())
        .await
        .map_err(StoreError::Store)?;
    }
    for id in &stale {
      self.store.remove(*id).await.map_err(StoreError::Store)?;
    }
    tracing::debug!(
      kind = T::KIND,
      eppn = state.eppn(),
      replaced,
      removed = stale.len(),
      "proofing state saved"
    );
    Ok(())
  }

  /// Returns `false` if the state was not stored.
  pub async fn remove_state(&self, state: &T) -> DbResult<bool, S> {
    let removed = self
      .store
      .remove(*state.id())
      .await
      .map_err(StoreError::Store)?;
    tracing::debug!(kind = T::KIND, eppn = state.eppn(), removed, "proofing state removed");
    Ok(removed)
  }
}

impl<S: DocumentStore> ProofingStateDb<S, OidcProofingState> {
  /// Look a flow up by the `state` value the provider echoes back.
  pub async fn get_state_by_oidc_state(
    &self,
    oidc_state: &str,
  ) -> DbResult<Option<OidcProofingState>, S> {
    self
      .find_one("state", Bson::String(oidc_state.to_owned()))
      .await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use bson::doc;

  use super::*;
  use crate::{
    document::Timestamp,
    proofing::{LetterProofingState, NinProofingElement},
  };

  #[derive(Debug, thiserror::Error)]
  #[error("memory store failure")]
  struct MemoryError;

  /// A collection held in a `Vec`, without any `_id` checks.
  #[derive(Default)]
  struct MemoryStore {
    docs: Mutex<Vec<Document>>,
  }

  impl MemoryStore {
    fn docs(&self) -> std::sync::MutexGuard<'_, Vec<Document>> {
      self.docs.lock().unwrap()
    }
  }

  impl DocumentStore for MemoryStore {
    type Error = MemoryError;

    async fn get_document_by_id(
      &self,
      id: ObjectId,
    ) -> Result<Option<Document>, MemoryError> {
      Ok(
        self
          .docs()
          .iter()
          .find(|d| d.get_object_id("_id").ok() == Some(id))
          .cloned(),
      )
    }

    async fn get_documents_by_attribute(
      &self,
      name: &str,
      value: Bson,
    ) -> Result<Vec<Document>, MemoryError> {
      Ok(
        self
          .docs()
          .iter()
          .filter(|d| d.get(name) == Some(&value))
          .cloned()
          .collect(),
      )
    }

    async fn insert(&self, doc: Document) -> Result<ObjectId, MemoryError> {
      let id = doc.get_object_id("_id").map_err(|_| MemoryError)?;
      self.docs().push(doc);
      Ok(id)
    }

    async fn update(&self, doc: Document) -> Result<(), MemoryError> {
      let id = doc.get_object_id("_id").map_err(|_| MemoryError)?;
      let mut docs = self.docs();
      let slot = docs
        .iter_mut()
        .find(|d| d.get_object_id("_id").ok() == Some(id))
        .ok_or(MemoryError)?;
      *slot = doc;
      Ok(())
    }

    async fn remove(&self, id: ObjectId) -> Result<bool, MemoryError> {
      let mut docs = self.docs();
      let before = docs.len();
      docs.retain(|d| d.get_object_id("_id").ok() != Some(id));
      Ok(docs.len() != before)
    }
  }

  fn state(eppn: &str) -> LetterProofingState {
    let nin =
      NinProofingElement::new("200102034567", "test", Timestamp::Now, None)
        .unwrap();
    LetterProofingState::new(eppn, nin)
  }

  #[tokio::test]
  async fn save_rejects_stored_state_without_object_id() {
    let store = MemoryStore::default();
    store
      .docs()
      .push(doc! { "_id": "legacy", "eduPersonPrincipalName": "foob-arra" });
    let db: ProofingStateDb<_, LetterProofingState> = ProofingStateDb::new(store);

    let err = db.save_state(&state("foob-arra")).await.unwrap_err();
    assert!(matches!(
      err,
      StoreError::Model(Error::InvalidValue { field: "_id", .. })
    ));
    assert_eq!(db.store().docs().len(), 1);
  }

  #[tokio::test]
  async fn save_removes_stale_states_after_writing() {
    let db: ProofingStateDb<_, LetterProofingState> =
      ProofingStateDb::new(MemoryStore::default());
    let first = state("foob-arra");
    let second = state("foob-arra");
    db.save_state(&first).await.unwrap();
    db.save_state(&second).await.unwrap();

    let docs = db.store().docs().clone();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get_object_id("_id").unwrap(), *second.id());
  }
}
