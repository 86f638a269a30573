//! Error types for vivaldi-node.

use thiserror::Error;
use vivaldi_core::{CoreError, SpaceError};
use vivaldi_gossip::GossipError;

/// Result type for swarm operations.
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Errors that can occur while building or running a swarm.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Invalid swarm parameters.
    #[error("invalid swarm configuration: {0}")]
    Config(String),

    /// The coordinate space could not be built.
    #[error("space error: {0}")]
    Space(#[from] SpaceError),

    /// A coordinate core rejected an operation.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Gossip setup or transport failed.
    #[error("gossip error: {0}")]
    Gossip(#[from] GossipError),
}
