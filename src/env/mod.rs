//! Environment resolution engine.
//!
//! Each namespace of an [`EnvStore`] maps keys to one of three value kinds:
//! - `constant`: a literal scalar
//! - `global`: a `namespace.key` reference into the tree's global store
//! - `auto`: a value produced by a [`Generator`] on first access
//!
//! Stores are merged key by key under a [`MergePolicy`]; allow-list merges
//! consult a [`Trie`] of dotted paths.

pub mod generator;
mod store;
pub mod trie;
mod value;

pub use generator::Generator;
pub use store::{EnvStore, MergeContext, MergePolicy};
pub(crate) use store::as_mapping;
pub use trie::Trie;
pub use value::{EnvEntry, ValueKind};
