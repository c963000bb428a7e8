//! Error types for `userdb-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind}: missing required field {field:?}")]
  MissingRequiredField {
    kind:  &'static str,
    field: &'static str,
  },

  /// Leftover fields in a document read with
  /// [`UnknownFieldPolicy::Reject`](crate::document::UnknownFieldPolicy).
  #[error("{kind}: unknown fields {fields:?}")]
  UnknownField {
    kind:   &'static str,
    fields: Vec<String>,
  },

  #[error("{kind}: invalid value for {field:?}: {value}")]
  InvalidValue {
    kind:  &'static str,
    field: &'static str,
    value: String,
  },

  #[error("duplicate {kind} key: {key}")]
  DuplicateKey { kind: &'static str, key: String },

  #[error("unknown {kind} key: {key}")]
  UnknownKey { kind: &'static str, key: String },

  #[error("{kind}: primary element violation: {reason}")]
  PrimaryInvariantViolation {
    kind:   &'static str,
    reason: &'static str,
  },

  #[error("unknown event_type: {0:?}")]
  UnknownEventType(String),

  #[error("cannot compare {left} with {right}")]
  TypeMismatch {
    left:  &'static str,
    right: &'static str,
  },
}

impl Error {
  pub(crate) fn missing(kind: &'static str, field: &'static str) -> Self {
    Self::MissingRequiredField { kind, field }
  }

  pub(crate) fn invalid(
    kind: &'static str,
    field: &'static str,
    value: impl std::fmt::Display,
  ) -> Self {
    Self::InvalidValue {
      kind,
      field,
      value: value.to_string(),
    }
  }

  pub(crate) fn primary(kind: &'static str, reason: &'static str) -> Self {
    Self::PrimaryInvariantViolation { kind, reason }
  }
}

/// Failure of a repository operation: either the record itself was invalid,
/// or the underlying [`DocumentStore`](crate::store::DocumentStore) failed.
#[derive(Debug, Error)]
pub enum StoreError<E: std::error::Error + 'static> {
  #[error(transparent)]
  Model(#[from] Error),

  #[error("store error: {0}")]
  Store(#[source] E),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
