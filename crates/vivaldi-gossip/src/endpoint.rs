//! Inbound side of the gossip protocol.
//!
//! A transport hands raw payloads to a [`GossipEndpoint`], which resolves the
//! target core by session, merges the update and offers accepted pushes to
//! observers for relaying. Exchanges are merged but never offered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use vivaldi_core::{
    ChannelSubject, Clock, CoordinateCore, CoreError, Envelope, ForwardCandidate, Guid, SystemClock,
};

use crate::error::{GossipError, Result};
use crate::wire::{self, WireScalar};

/// Session identifier to core, for hosts running several cores.
pub struct SessionMap<S: WireScalar> {
    cores: RwLock<HashMap<Guid, Arc<CoordinateCore<S>>>>,
}

impl<S: WireScalar> Default for SessionMap<S> {
    fn default() -> Self {
        Self {
            cores: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: WireScalar> SessionMap<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `core` under its current session.
    pub fn register(&self, core: Arc<CoordinateCore<S>>) -> Option<Arc<CoordinateCore<S>>> {
        let session = core.session();
        self.cores.write().insert(session, core)
    }

    /// Move `core` to `session`, updating both the core and the map.
    pub fn rebind(&self, core: &Arc<CoordinateCore<S>>, session: Guid) {
        let mut cores = self.cores.write();
        let old = core.session();
        if cores.get(&old).is_some_and(|c| Arc::ptr_eq(c, core)) {
            cores.remove(&old);
        }
        core.set_session(session);
        cores.insert(session, Arc::clone(core));
        debug!(node = %core.guid(), from = %old, to = %session, "core rebound");
    }

    pub fn remove(&self, session: &Guid) -> Option<Arc<CoordinateCore<S>>> {
        self.cores.write().remove(session)
    }

    pub fn get(&self, session: &Guid) -> Option<Arc<CoordinateCore<S>>> {
        self.cores.read().get(session).cloned()
    }

    pub fn len(&self) -> usize {
        self.cores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.read().is_empty()
    }
}

/// Handles push, pull and exchange requests addressed to this host.
pub struct GossipEndpoint<S: WireScalar> {
    sessions: Arc<SessionMap<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: WireScalar> GossipEndpoint<S> {
    pub fn new(sessions: Arc<SessionMap<S>>) -> Self {
        Self::with_clock(sessions, Arc::new(SystemClock))
    }

    pub fn with_clock(sessions: Arc<SessionMap<S>>, clock: Arc<dyn Clock>) -> Self {
        Self { sessions, clock }
    }

    /// Endpoint serving a single core.
    pub fn for_core(core: Arc<CoordinateCore<S>>) -> Self {
        let sessions = SessionMap::new();
        sessions.register(core);
        Self::new(Arc::new(sessions))
    }

    pub fn sessions(&self) -> &Arc<SessionMap<S>> {
        &self.sessions
    }

    /// Accept a pushed or relayed payload.
    ///
    /// The payload is merged into the core named by its session. If the merge
    /// was accepted, fully or partially, it is also published on the core's
    /// bus so the local gossiper can relay it.
    pub fn handle_push(&self, bytes: &[u8]) -> Result<()> {
        let envelope = wire::decode::<S>(bytes)?;
        let candidate = ForwardCandidate::new(envelope.clone());
        let (core, merged) = self.merge(envelope)?;

        match merged {
            Ok(()) => {
                core.push_to_channels(candidate);
                Ok(())
            }
            Err(CoreError::PartialMerge(rejected)) => {
                core.push_to_channels(candidate);
                Err(CoreError::PartialMerge(rejected).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serve a pull: our current delta for `session`, freshly stamped.
    pub fn handle_pull(&self, session: Guid) -> Result<Vec<u8>> {
        let core = self.core_for(session)?;
        self.reply(&core)
    }

    /// Merge followed by pull, in one round trip.
    ///
    /// Exchanges are point-to-point and never published for relaying. A
    /// partially merged payload still gets a reply.
    pub fn handle_exchange(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let envelope = wire::decode::<S>(bytes)?;
        let (core, merged) = self.merge(envelope)?;

        match merged {
            Ok(()) => {}
            Err(CoreError::PartialMerge(rejected)) => {
                warn!(rejected = rejected.len(), "exchange merged partially");
            }
            Err(e) => return Err(e.into()),
        }

        self.reply(&core)
    }

    /// Resolve the target core and merge into it.
    ///
    /// The outer error means no core serves the session; the inner result is
    /// the merge outcome.
    fn merge(&self, envelope: Envelope<S>) -> Result<(Arc<CoordinateCore<S>>, vivaldi_core::Result<()>)> {
        let received = self.clock.now_nanos();
        let core = self.core_for(envelope.session)?;
        trace!(
            node = %core.guid(),
            sender = %envelope.sender,
            message_id = %envelope.message_id,
            entries = envelope.entries.len(),
            "payload received"
        );

        let merged = envelope.into_message(received).and_then(|message| core.update_state(message));
        Ok((core, merged))
    }

    fn core_for(&self, session: Guid) -> Result<Arc<CoordinateCore<S>>> {
        self.sessions.get(&session).ok_or(GossipError::UnknownSession(session))
    }

    fn reply(&self, core: &CoordinateCore<S>) -> Result<Vec<u8>> {
        let envelope = Envelope::from_updates(core.state_updates(), Guid::generate(), self.clock.now_nanos());
        wire::encode(&envelope)
    }
}
