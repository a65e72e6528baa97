use thiserror::Error;

use crate::value::ValueKind;

/// Coercion failure when model code reads a typed attribute.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("expected a {expected} value, found {found}")]
    TypeMismatch {
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("key not found: {0}")]
    KeyNotFound(String),
}
