//! Error types for vivaldi-gossip.

use std::time::Duration;

use thiserror::Error;
use vivaldi_core::{CoreError, Guid};

/// Result type for gossip operations.
pub type Result<T> = std::result::Result<T, GossipError>;

/// Errors that can occur while disseminating or receiving gossip.
#[derive(Debug, Error)]
pub enum GossipError {
    /// The coordinate core rejected an operation.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The transport could not deliver to the peer.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: Guid, reason: String },

    /// The peer did not answer within the call timeout.
    #[error("peer {peer} timed out after {after:?}")]
    Timeout { peer: Guid, after: Duration },

    /// An inbound payload could not be decoded.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// No core is registered for the session the payload names.
    #[error("no core registered for session {0}")]
    UnknownSession(Guid),

    /// Encoding an outbound payload failed.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Invalid gossip configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GossipError {
    /// Whether the error means the peer could not be reached, as opposed to
    /// the peer answering with a rejection.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::PeerUnreachable { .. } | Self::Timeout { .. })
    }
}
