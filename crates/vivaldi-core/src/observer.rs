//! Channel observer bus.
//!
//! Decouples a producer of "relay this" events (the core, fed by the inbound
//! transport) from the consumer that decides what to relay (the gossiper).
//! Each registration is an unbounded queue, so publishing never blocks the
//! producer no matter how slow a consumer is. Ordering is FIFO per queue and
//! nothing more.
//!
//! An observer may register one sender with several subjects; the queues then
//! fan in to a single receiver and the consumer waits on one channel instead
//! of polling each subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Handle identifying one registration on a subject.
pub type ChannelId = u64;

/// A source of events that observers can register queues with.
pub trait ChannelSubject<E>: Send + Sync {
    /// Register a queue; every later event is delivered to it.
    fn register_channel(&self, sender: UnboundedSender<E>) -> ChannelId;

    /// Drop the registration, closing the subject's side of the queue.
    ///
    /// Returns false if the handle was not registered.
    fn unregister_channel(&self, id: ChannelId) -> bool;

    /// Enqueue `event` on every registered queue without blocking.
    fn push_to_channels(&self, event: E);
}

/// A registration together with its receiving end.
#[derive(Debug)]
pub struct Subscription<E> {
    pub id: ChannelId,
    pub receiver: UnboundedReceiver<E>,
}

/// Default [`ChannelSubject`] implementation.
#[derive(Debug)]
pub struct ChannelBus<E> {
    channels: RwLock<HashMap<ChannelId, UnboundedSender<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for ChannelBus<E> {
    fn default() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<E: Clone + Send + Sync> ChannelBus<E> {
    /// Create a bus with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dedicated queue and hand back its receiver.
    ///
    /// The receiver yields `None` once the registration is dropped.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        Subscription {
            id: self.register_channel(tx),
            receiver: rx,
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

impl<E: Clone + Send + Sync> ChannelSubject<E> for ChannelBus<E> {
    fn register_channel(&self, sender: UnboundedSender<E>) -> ChannelId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels.write().insert(id, sender);
        id
    }

    fn unregister_channel(&self, id: ChannelId) -> bool {
        self.channels.write().remove(&id).is_some()
    }

    fn push_to_channels(&self, event: E) {
        let mut closed = Vec::new();
        {
            let channels = self.channels.read();
            for (id, tx) in channels.iter() {
                if tx.send(event.clone()).is_err() {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            trace!(count = closed.len(), "pruning closed observer channels");
            let mut channels = self.channels.write();
            for id in closed {
                channels.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_every_subscriber() {
        let bus = ChannelBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.push_to_channels(7u32);
        bus.push_to_channels(8u32);

        assert_eq!(a.receiver.try_recv().unwrap(), 7);
        assert_eq!(a.receiver.try_recv().unwrap(), 8);
        assert_eq!(b.receiver.try_recv().unwrap(), 7);
        assert_eq!(b.receiver.try_recv().unwrap(), 8);
    }

    #[test]
    fn unregister_closes_queue_and_is_idempotent() {
        let bus = ChannelBus::<u32>::new();
        let mut sub = bus.subscribe();

        assert!(bus.unregister_channel(sub.id));
        assert!(!bus.unregister_channel(sub.id));
        assert!(matches!(
            sub.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // Publishing with no registrations is a no-op
        bus.push_to_channels(1);
        assert!(bus.is_empty());
    }

    #[test]
    fn shared_sender_fans_in_from_several_subjects() {
        let first = ChannelBus::new();
        let second = ChannelBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        first.register_channel(tx.clone());
        second.register_channel(tx);

        first.push_to_channels("a");
        second.push_to_channels("b");

        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = ChannelBus::new();
        let sub = bus.subscribe();
        let _kept = bus.subscribe();
        drop(sub);

        bus.push_to_channels(1u8);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn handles_are_not_reused() {
        let bus = ChannelBus::<u8>::new();
        let a = bus.subscribe();
        bus.unregister_channel(a.id);
        let b = bus.subscribe();
        assert_ne!(a.id, b.id);
    }
}
