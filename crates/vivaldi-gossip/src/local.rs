//! In-process transport.
//!
//! Connects [`GossipEndpoint`]s living in the same process. Payloads still go
//! through the wire codec, links can carry a synthetic one-way latency, and
//! nodes can be marked down to simulate unreachable peers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use vivaldi_core::{Envelope, Guid, PeerState};

use crate::channel::PeerChannel;
use crate::endpoint::GossipEndpoint;
use crate::error::{GossipError, Result};
use crate::registry::ConnectionRegistry;
use crate::wire::{self, WireScalar};

/// One-way delay between two nodes.
pub type LatencyFn = Arc<dyn Fn(Guid, Guid) -> Duration + Send + Sync>;

struct Link<S: WireScalar> {
    endpoint: Arc<GossipEndpoint<S>>,
    latency: Duration,
}

struct Node<S: WireScalar> {
    endpoint: Arc<GossipEndpoint<S>>,
    up: AtomicBool,
    connections: ConnectionRegistry<Link<S>>,
}

struct Inner<S: WireScalar> {
    nodes: RwLock<HashMap<Guid, Arc<Node<S>>>>,
    latency: LatencyFn,
}

/// A set of endpoints that can reach each other in memory.
pub struct LocalNetwork<S: WireScalar> {
    inner: Arc<Inner<S>>,
}

impl<S: WireScalar> Clone for LocalNetwork<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: WireScalar> Default for LocalNetwork<S> {
    fn default() -> Self {
        Self::with_latency(|_, _| Duration::ZERO)
    }
}

impl<S: WireScalar> std::fmt::Debug for LocalNetwork<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("nodes", &self.inner.nodes.read().len())
            .finish()
    }
}

impl<S: WireScalar> LocalNetwork<S> {
    /// A network with instantaneous links.
    pub fn new() -> Self {
        Self::default()
    }

    /// A network whose link from `a` to `b` takes `latency(a, b)` each way.
    pub fn with_latency(latency: impl Fn(Guid, Guid) -> Duration + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(HashMap::new()),
                latency: Arc::new(latency),
            }),
        }
    }

    /// Make `endpoint` reachable as `guid`.
    pub fn attach(&self, guid: Guid, endpoint: Arc<GossipEndpoint<S>>) {
        let node = Node {
            endpoint,
            up: AtomicBool::new(true),
            connections: ConnectionRegistry::new(),
        };
        self.inner.nodes.write().insert(guid, Arc::new(node));
        debug!(node = %guid, "attached to local network");
    }

    /// Remove a node. Existing channels to it keep working until dropped.
    pub fn detach(&self, guid: &Guid) -> bool {
        self.inner.nodes.write().remove(guid).is_some()
    }

    /// Mark a node reachable or not.
    pub fn set_up(&self, guid: &Guid, up: bool) {
        if let Some(node) = self.node(guid) {
            node.up.store(up, Ordering::SeqCst);
            debug!(node = %guid, up, "node availability changed");
        }
    }

    /// Whether `guid` is attached and up.
    pub fn is_up(&self, guid: &Guid) -> bool {
        self.node(guid).is_some_and(|node| node.up.load(Ordering::SeqCst))
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }

    /// Configured one-way delay from `from` to `to`.
    pub fn latency(&self, from: Guid, to: Guid) -> Duration {
        (self.inner.latency)(from, to)
    }

    /// Open (or share) a channel from `from` to `to`.
    pub fn connect(&self, from: Guid, to: Guid) -> Result<LocalChannel<S>> {
        let source = self.node(&from).ok_or_else(|| GossipError::PeerUnreachable {
            peer: from,
            reason: "source not attached".into(),
        })?;
        let target = self.node(&to).ok_or_else(|| GossipError::PeerUnreachable {
            peer: to,
            reason: "not attached".into(),
        })?;

        let link = source.connections.acquire(to, || {
            Ok(Link {
                endpoint: Arc::clone(&target.endpoint),
                latency: self.latency(from, to),
            })
        })?;

        Ok(LocalChannel {
            from,
            to,
            network: self.clone(),
            link,
        })
    }

    /// Open connections held by `guid`.
    pub fn connections(&self, guid: &Guid) -> usize {
        self.node(guid).map_or(0, |node| node.connections.active())
    }

    fn node(&self, guid: &Guid) -> Option<Arc<Node<S>>> {
        self.inner.nodes.read().get(guid).cloned()
    }
}

/// A [`PeerChannel`] over a [`LocalNetwork`].
pub struct LocalChannel<S: WireScalar> {
    from: Guid,
    to: Guid,
    network: LocalNetwork<S>,
    link: Arc<Link<S>>,
}

impl<S: WireScalar> LocalChannel<S> {
    /// One hop across the link.
    async fn transit(&self) -> Result<()> {
        if !self.network.is_up(&self.to) {
            return Err(GossipError::PeerUnreachable {
                peer: self.to,
                reason: "node down".into(),
            });
        }
        if !self.link.latency.is_zero() {
            tokio::time::sleep(self.link.latency).await;
        }
        Ok(())
    }
}

impl<S: WireScalar> Drop for LocalChannel<S> {
    fn drop(&mut self) {
        if let Some(node) = self.network.node(&self.from) {
            node.connections.release(&self.to);
        }
    }
}

#[async_trait]
impl<S: WireScalar> PeerChannel<S> for LocalChannel<S> {
    fn peer(&self) -> Guid {
        self.to
    }

    async fn push(&self, payload: &Envelope<S>) -> Result<()> {
        let bytes = wire::encode(payload)?;
        self.transit().await?;
        self.link.endpoint.handle_push(&bytes)
    }

    async fn pull(&self, _requester: &PeerState<S>, session: Guid) -> Result<Envelope<S>> {
        self.transit().await?;
        let reply = self.link.endpoint.handle_pull(session)?;
        self.transit().await?;
        wire::decode(&reply)
    }

    async fn exchange(&self, payload: &Envelope<S>) -> Result<Envelope<S>> {
        let bytes = wire::encode(payload)?;
        self.transit().await?;
        let reply = self.link.endpoint.handle_exchange(&bytes)?;
        self.transit().await?;
        wire::decode(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vivaldi_core::{CoordinateCore, NormedVectorSpace, VivaldiTuning};

    fn node(network: &LocalNetwork<f64>, at: Vec<f64>) -> Arc<CoordinateCore<f64>> {
        let space = NormedVectorSpace::euclidean(2).unwrap();
        let core = Arc::new(CoordinateCore::new(Guid::generate(), at, space, VivaldiTuning::default()).unwrap());
        network.attach(core.guid(), Arc::new(GossipEndpoint::for_core(Arc::clone(&core))));
        core
    }

    #[tokio::test]
    async fn push_and_pull_cross_the_network() {
        let network = LocalNetwork::new();
        let a = node(&network, vec![0.0, 0.0]);
        let b = node(&network, vec![3.0, 4.0]);

        let channel = network.connect(a.guid(), b.guid()).unwrap();
        let payload = Envelope::from_updates(a.state_updates(), Guid::generate(), 0);
        channel.push(&payload).await.unwrap();
        assert_eq!(b.peer_status(&a.guid()), Some(false));

        let reply = channel.pull(&a.my_state(), a.session()).await.unwrap();
        assert_eq!(reply.sender, b.guid());
    }

    #[tokio::test]
    async fn down_nodes_are_unreachable() {
        let network = LocalNetwork::new();
        let a = node(&network, vec![0.0, 0.0]);
        let b = node(&network, vec![3.0, 4.0]);
        let channel = network.connect(a.guid(), b.guid()).unwrap();

        network.set_up(&b.guid(), false);
        let payload = Envelope::from_updates(a.state_updates(), Guid::generate(), 0);
        assert!(channel.push(&payload).await.unwrap_err().is_unreachable());

        network.set_up(&b.guid(), true);
        assert!(channel.push(&payload).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied_per_hop() {
        let network = LocalNetwork::with_latency(|_, _| Duration::from_millis(40));
        let a = node(&network, vec![0.0, 0.0]);
        let b = node(&network, vec![3.0, 4.0]);
        let channel = network.connect(a.guid(), b.guid()).unwrap();

        let started = tokio::time::Instant::now();
        channel.pull(&a.my_state(), a.session()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn channels_share_and_release_connections() {
        let network = LocalNetwork::<f64>::new();
        let a = node(&network, vec![0.0, 0.0]);
        let b = node(&network, vec![3.0, 4.0]);

        let first = network.connect(a.guid(), b.guid()).unwrap();
        let second = network.connect(a.guid(), b.guid()).unwrap();
        assert!(Arc::ptr_eq(&first.link, &second.link));
        assert_eq!(network.connections(&a.guid()), 1);

        drop(first);
        assert_eq!(network.connections(&a.guid()), 1);
        drop(second);
        assert_eq!(network.connections(&a.guid()), 0);

        let stranger = Guid::generate();
        assert!(matches!(network.connect(a.guid(), stranger), Err(e) if e.is_unreachable()));
    }
}
