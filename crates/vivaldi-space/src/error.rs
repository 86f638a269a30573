//! Error types for vivaldi-space.

use thiserror::Error;

/// Result type for space operations.
pub type Result<T> = std::result::Result<T, SpaceError>;

/// Errors raised by spaces and points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceError {
    /// The space was built with a zero dimension or a missing operation.
    #[error("malformed space: {0}")]
    Configuration(&'static str),

    /// A point from another space instance was passed in.
    #[error("the points do not belong to this space")]
    SpaceMismatch,

    /// A coordinate vector has the wrong length for the space.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
