//! Error types for vivaldi-core.

use thiserror::Error;
use vivaldi_space::SpaceError;

use crate::guid::Guid;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A space or point operation failed.
    #[error("space error: {0}")]
    Space(#[from] SpaceError),

    /// Invalid tuning or construction parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The update belongs to another synchronisation epoch.
    #[error("incompatible core session: expected {expected}, received {received}")]
    SessionMismatch { expected: Guid, received: Guid },

    /// Some entries of a batch could not be merged; the rest were.
    #[error("{} entries rejected during merge", .0.len())]
    PartialMerge(Vec<(Guid, SpaceError)>),

    /// Entries were merged but the coordinate step failed. `rejected` holds
    /// any entries the merge skipped, as in [`CoreError::PartialMerge`].
    #[error("coordinate step failed: {error} ({} entries rejected during merge)", rejected.len())]
    StepFailed {
        error: SpaceError,
        rejected: Vec<(Guid, SpaceError)>,
    },

    /// The peer is not in the cache.
    #[error("unknown peer {0}")]
    UnknownPeer(Guid),

    /// Malformed inbound gossip metadata.
    #[error("bad payload: {0}")]
    BadPayload(String),
}
