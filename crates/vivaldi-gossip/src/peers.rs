//! Gossip membership: the set of peers a node can reach.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::debug;
use vivaldi_core::{Guid, Support};

use crate::channel::PeerChannel;

/// Shared handle to a peer connection.
pub type SharedChannel<S> = Arc<dyn PeerChannel<S>>;

/// Read-mostly map from peer guid to its channel.
///
/// Fan-out copies the channels it needs under a short read lock, so joins and
/// leaves never wait for an in-flight round and a round never sees a
/// half-applied change.
pub struct PeerMap<S: Support> {
    peers: RwLock<HashMap<Guid, SharedChannel<S>>>,
}

impl<S: Support> Default for PeerMap<S> {
    fn default() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: Support> std::fmt::Debug for PeerMap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerMap").field("peers", &self.guids()).finish()
    }
}

impl<S: Support> PeerMap<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a peer. Returns the channel it replaced, if any.
    pub fn add_peer(&self, channel: SharedChannel<S>) -> Option<SharedChannel<S>> {
        let guid = channel.peer();
        let previous = self.peers.write().insert(guid, channel);
        debug!(peer = %guid, replaced = previous.is_some(), "peer added");
        previous
    }

    /// Remove a peer. Returns false if it was not a member.
    pub fn remove_peer(&self, guid: &Guid) -> bool {
        let removed = self.peers.write().remove(guid).is_some();
        if removed {
            debug!(peer = %guid, "peer removed");
        }
        removed
    }

    pub fn get(&self, guid: &Guid) -> Option<SharedChannel<S>> {
        self.peers.read().get(guid).cloned()
    }

    pub fn contains(&self, guid: &Guid) -> bool {
        self.peers.read().contains_key(guid)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn guids(&self) -> Vec<Guid> {
        self.peers.read().keys().copied().collect()
    }

    /// Up to `count` random members not in `exclude`.
    pub fn select(&self, count: usize, exclude: &HashSet<Guid>) -> Vec<SharedChannel<S>> {
        let mut candidates: Vec<SharedChannel<S>> = self
            .peers
            .read()
            .iter()
            .filter(|(guid, _)| !exclude.contains(guid))
            .map(|(_, channel)| Arc::clone(channel))
            .collect();

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(count);
        candidates
    }
}
