//! Error types for state store operations

use crate::StatePath;
use thiserror::Error;

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by state store mutators
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A path segment tried to descend through a scalar value
    #[error("cannot descend into '{path}': not an object or array")]
    NotAContainer { path: StatePath },

    /// The value at the path has the wrong shape for the operation
    #[error("expected {expected} at '{path}'")]
    TypeMismatch {
        path: StatePath,
        expected: &'static str,
    },

    /// An array was addressed with a non-numeric or out of range segment
    #[error("invalid array index '{segment}' at '{path}'")]
    InvalidIndex { path: StatePath, segment: String },

    /// A mutator was called through a read-only view
    #[error("cannot {method} '{path}': state is read-only here")]
    ReadOnly {
        method: &'static str,
        path: StatePath,
    },

    /// The argument passed to a mutator has the wrong shape
    #[error("{method} expects {expected}")]
    InvalidArgument {
        method: &'static str,
        expected: &'static str,
    },
}
