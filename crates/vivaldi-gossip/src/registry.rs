//! Reference-counted pool of peer connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use vivaldi_core::Guid;

use crate::error::Result;

struct Slot<C> {
    connection: Arc<C>,
    holders: usize,
}

/// Shares one connection per peer between every user on a host.
///
/// `acquire` opens the connection on first use and hands out clones after
/// that; `release` closes it when the last holder lets go. The registry is a
/// plain value, so separate hosts in one process keep separate pools.
pub struct ConnectionRegistry<C> {
    slots: Mutex<HashMap<Guid, Slot<C>>>,
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared connection to `peer`, opened with `connect` if none exists.
    ///
    /// A failed `connect` leaves the registry unchanged.
    pub fn acquire(&self, peer: Guid, connect: impl FnOnce() -> Result<C>) -> Result<Arc<C>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&peer) {
            slot.holders += 1;
            return Ok(Arc::clone(&slot.connection));
        }

        let connection = Arc::new(connect()?);
        slots.insert(
            peer,
            Slot {
                connection: Arc::clone(&connection),
                holders: 1,
            },
        );
        trace!(peer = %peer, "connection opened");
        Ok(connection)
    }

    /// Drop one hold on `peer`'s connection.
    ///
    /// Returns true if this was the last holder and the connection was closed.
    pub fn release(&self, peer: &Guid) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(peer) else {
            return false;
        };

        slot.holders -= 1;
        if slot.holders == 0 {
            slots.remove(peer);
            trace!(peer = %peer, "connection closed");
            true
        } else {
            false
        }
    }

    /// Number of open connections.
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }

    /// Current holders of `peer`'s connection.
    pub fn holders(&self, peer: &Guid) -> usize {
        self.slots.lock().get(peer).map_or(0, |slot| slot.holders)
    }
}
