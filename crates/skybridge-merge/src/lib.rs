//! Skybridge reconciliation merge
//!
//! Combines a remote resource's observed state with a freshly defaulted
//! request payload. Each (source kind, target kind) pair declares its field
//! correspondence once as a [`FieldMap`]; fields whose shapes differ between
//! the two kinds are handled by [`Binding`]s carrying a translator, which may
//! merge a nested pair recursively or project list elements.
//!
//! The merge copies source values unconditionally. Locally desired values
//! win only because callers apply them to the target after merging.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod field_map;

// Re-exports
pub use error::{MergeError, Result, TranslatorError};
pub use field_map::{Binding, Field, FieldMap};
