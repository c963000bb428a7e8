//! Core types for the user database.
//!
//! Typed, validated records (elements, element lists, events, actions and
//! proofing states) and their conversion to and from store documents.
//! This crate is deliberately free of database dependencies; storage goes
//! through the [`store::DocumentStore`] trait.

pub mod action;
pub mod any;
pub mod db;
pub mod document;
pub mod element;
pub mod error;
pub mod event;
pub mod list;
pub mod mail;
pub mod nin;
pub mod phone;
pub mod proofing;
pub mod store;
pub mod tou;

pub use error::{Error, Result, StoreError};
pub use document::{Timestamp, UnknownFieldPolicy};
pub use element::{DocumentRecord, HasPrimary, KeyedElement};
pub use list::{ElementInput, ElementList, PrimaryElementList};
