//! Data exchanged between the core, the gossiper and the transport.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vivaldi_space::Support;

use crate::clock::rtt_millis;
use crate::error::{CoreError, Result};
use crate::guid::Guid;

/// Failure flag and coordinates of one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerDelta<S> {
    pub is_failed: bool,
    pub coordinates: Vec<S>,
}

/// Delta export of a core: its own position plus every dirty peer entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdates<S> {
    pub session: Guid,
    /// The exporting node.
    pub origin: Guid,
    pub error_estimate: f64,
    /// Always contains `origin`.
    pub entries: HashMap<Guid, PeerDelta<S>>,
}

impl<S> StateUpdates<S> {
    /// Entries other than the exporting node itself.
    pub fn peers(&self) -> impl Iterator<Item = (&Guid, &PeerDelta<S>)> {
        let origin = self.origin;
        self.entries.iter().filter(move |(g, _)| **g != origin)
    }
}

/// An inbound update, ready to be merged by [`CoordinateCore::update_state`].
///
/// `sender` is the node that delivered the message, possibly a relay.
/// `communicator` is the node whose timestamp produced `measured_rtt`; the
/// Vivaldi step moves toward or away from it.
///
/// [`CoordinateCore::update_state`]: crate::CoordinateCore::update_state
#[derive(Debug, Clone, PartialEq)]
pub struct GossipMessage<S> {
    pub session: Guid,
    pub sender: Guid,
    pub communicator: Guid,
    /// Milliseconds.
    pub measured_rtt: f64,
    pub sender_error_estimate: f64,
    pub deltas: HashMap<Guid, PeerDelta<S>>,
}

impl<S: Support> GossipMessage<S> {
    /// Reject metadata no honest sender produces.
    ///
    /// The sender's error estimate must be finite and non-negative, and every
    /// coordinate component finite.
    pub fn validate(&self) -> Result<()> {
        let ej = self.sender_error_estimate;
        if !(ej.is_finite() && ej >= 0.0) {
            return Err(CoreError::BadPayload(format!(
                "error estimate {ej} from {}",
                self.sender
            )));
        }
        for (guid, delta) in &self.deltas {
            if !delta.coordinates.iter().all(|c| c.is_finite()) {
                return Err(CoreError::BadPayload(format!("non-finite coordinates for {guid}")));
            }
        }
        Ok(())
    }
}

/// Non-destructive snapshot of a node's own state.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerState<S> {
    pub guid: Guid,
    pub coordinates: Vec<S>,
    pub error_estimate: f64,
}

/// One peer inside an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry<S> {
    pub guid: Guid,
    pub failed: bool,
    pub coordinates: Vec<S>,
}

/// The unit that travels between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<S> {
    pub message_id: Guid,
    pub session: Guid,
    /// Last hop; rewritten by every relay.
    pub sender: Guid,
    pub error_estimate: f64,
    /// Sender's clock at send time, nanoseconds since the epoch.
    pub timestamp_nanos: i64,
    pub entries: Vec<WireEntry<S>>,
}

impl<S: Support> Envelope<S> {
    /// Wrap a core's delta export for sending.
    pub fn from_updates(updates: StateUpdates<S>, message_id: Guid, timestamp_nanos: i64) -> Self {
        let entries = updates
            .entries
            .into_iter()
            .map(|(guid, delta)| WireEntry {
                guid,
                failed: delta.is_failed,
                coordinates: delta.coordinates,
            })
            .collect();

        Self {
            message_id,
            session: updates.session,
            sender: updates.origin,
            error_estimate: updates.error_estimate,
            timestamp_nanos,
            entries,
        }
    }

    /// Copy of this payload as relayed by `relay`.
    ///
    /// The relay's own entry is replaced (or appended) with its current
    /// coordinates, and the sender, error estimate and timestamp become the
    /// relay's, since the receiver's RTT sample will be against the relay.
    pub fn relayed_by(&self, relay: &PeerState<S>, timestamp_nanos: i64) -> Self {
        let mut relayed = self.clone();

        match relayed.entries.iter_mut().find(|e| e.guid == relay.guid) {
            Some(entry) => {
                entry.coordinates = relay.coordinates.clone();
                entry.failed = false;
            }
            None => relayed.entries.push(WireEntry {
                guid: relay.guid,
                failed: false,
                coordinates: relay.coordinates.clone(),
            }),
        }

        relayed.sender = relay.guid;
        relayed.error_estimate = relay.error_estimate;
        relayed.timestamp_nanos = timestamp_nanos;
        relayed
    }

    /// Turn a received envelope into a mergeable message.
    ///
    /// Fails with [`CoreError::BadPayload`] if a guid appears twice or the
    /// metadata does not pass [`GossipMessage::validate`].
    pub fn into_message(self, received_nanos: i64) -> Result<GossipMessage<S>> {
        let mut deltas = HashMap::with_capacity(self.entries.len());
        for entry in self.entries {
            let delta = PeerDelta {
                is_failed: entry.failed,
                coordinates: entry.coordinates,
            };
            if deltas.insert(entry.guid, delta).is_some() {
                return Err(CoreError::BadPayload(format!("duplicate entry for {}", entry.guid)));
            }
        }

        let message = GossipMessage {
            session: self.session,
            sender: self.sender,
            communicator: self.sender,
            measured_rtt: rtt_millis(self.timestamp_nanos, received_nanos),
            sender_error_estimate: self.error_estimate,
            deltas,
        };
        message.validate()?;
        Ok(message)
    }
}

/// An inbound push the gossiper may relay.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardCandidate<S> {
    pub message_id: Guid,
    /// Hop that delivered the message; it is never relayed back to.
    pub sender: Guid,
    pub payload: Envelope<S>,
}

impl<S: Clone> ForwardCandidate<S> {
    /// Candidate for relaying `payload`.
    pub fn new(payload: Envelope<S>) -> Self {
        Self {
            message_id: payload.message_id,
            sender: payload.sender,
            payload,
        }
    }
}
