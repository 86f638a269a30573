//! The transport seam: how the gossiper reaches one peer.

use async_trait::async_trait;
use vivaldi_core::{Envelope, Guid, PeerState, Support};

use crate::error::Result;

/// A connection to a single remote node.
///
/// Implementations own framing and addressing; the gossiper only hands over
/// envelopes. Calls may block for as long as the transport likes, the caller
/// wraps every call in its own timeout.
#[async_trait]
pub trait PeerChannel<S: Support>: Send + Sync {
    /// The remote node's identifier.
    fn peer(&self) -> Guid;

    /// Deliver a locally originated delta.
    async fn push(&self, payload: &Envelope<S>) -> Result<()>;

    /// Ask the peer for its current delta.
    ///
    /// `requester` identifies the caller; `session` selects the remote core.
    async fn pull(&self, requester: &PeerState<S>, session: Guid) -> Result<Envelope<S>>;

    /// Push our delta and receive the peer's in reply.
    async fn exchange(&self, payload: &Envelope<S>) -> Result<Envelope<S>>;

    /// Relay a payload that originated elsewhere.
    ///
    /// Transports that do not distinguish relays from pushes can keep the
    /// default.
    async fn forward(&self, payload: &Envelope<S>) -> Result<()> {
        self.push(payload).await
    }
}
