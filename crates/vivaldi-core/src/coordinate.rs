//! The coordinate core: peer cache, session and the Vivaldi step.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};
use vivaldi_space::{NormedVectorSpace, Point, SpaceError, Support};

use crate::config::VivaldiTuning;
use crate::error::{CoreError, Result};
use crate::guid::Guid;
use crate::message::{ForwardCandidate, GossipMessage, PeerDelta, PeerState, StateUpdates};
use crate::observer::{ChannelBus, ChannelId, ChannelSubject};

/// Weight used when both error estimates are zero, so the node keeps moving.
pub const ZERO_ERROR_WEIGHT: f64 = 1e-5;

/// The state-synchronisation contract offered to the dissemination layer.
pub trait CoreGate<S: Support>: Send + Sync {
    /// This node's identifier.
    fn guid(&self) -> Guid;

    /// Current synchronisation epoch.
    fn session(&self) -> Guid;

    /// Own coordinates plus every dirty peer entry; clears the dirty flags.
    fn state_updates(&self) -> Result<StateUpdates<S>>;

    /// Own guid, coordinates and error estimate.
    fn my_state(&self) -> PeerState<S>;

    /// Merge an inbound update and run the coordinate step.
    fn update_state(&self, message: GossipMessage<S>) -> Result<()>;

    /// Mark peers as failed after an unsuccessful delivery.
    fn signal_failed(&self, peers: &[Guid]);
}

#[derive(Debug)]
struct PeerEntry<S> {
    coordinates: Point<S>,
    is_failed: bool,
    dirty: bool,
}

#[derive(Debug)]
struct CoreState<S> {
    my_coordinates: Point<S>,
    error_estimate: f64,
    peers: HashMap<Guid, PeerEntry<S>>,
}

/// A Vivaldi coordinate core.
///
/// The session and the coordinate state sit behind separate locks, so a
/// session check never waits on a long merge.
#[derive(Debug)]
pub struct CoordinateCore<S: Support> {
    guid: Guid,
    space: Arc<NormedVectorSpace<S>>,
    tuning: VivaldiTuning,
    session: RwLock<Guid>,
    state: RwLock<CoreState<S>>,
    bus: ChannelBus<ForwardCandidate<S>>,
}

impl<S: Support> CoordinateCore<S> {
    /// Create a core at `coordinates` in the nil session.
    pub fn new(
        guid: Guid,
        coordinates: Vec<S>,
        space: Arc<NormedVectorSpace<S>>,
        tuning: VivaldiTuning,
    ) -> Result<Self> {
        tuning.validate()?;
        let my_coordinates = Point::new(&space, coordinates)?;

        Ok(Self {
            guid,
            space,
            tuning,
            session: RwLock::new(Guid::nil()),
            state: RwLock::new(CoreState {
                my_coordinates,
                error_estimate: tuning.initial_error,
                peers: HashMap::new(),
            }),
            bus: ChannelBus::new(),
        })
    }

    /// Create a core at the origin of `space`.
    pub fn at_origin(guid: Guid, space: Arc<NormedVectorSpace<S>>, tuning: VivaldiTuning) -> Result<Self> {
        let origin = space.origin().into_coordinates();
        Self::new(guid, origin, space, tuning)
    }

    /// Start in `session` instead of the nil session.
    #[must_use]
    pub fn with_session(self, session: Guid) -> Self {
        self.set_session(session);
        self
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn space(&self) -> &Arc<NormedVectorSpace<S>> {
        &self.space
    }

    pub fn tuning(&self) -> VivaldiTuning {
        self.tuning
    }

    pub fn session(&self) -> Guid {
        *self.session.read()
    }

    /// Move to a new epoch; updates tagged with the old one are rejected.
    pub fn set_session(&self, session: Guid) {
        *self.session.write() = session;
    }

    /// Current own coordinates.
    pub fn coordinates(&self) -> Vec<S> {
        self.state.read().my_coordinates.coordinates().to_vec()
    }

    /// Current error estimate.
    pub fn error_estimate(&self) -> f64 {
        self.state.read().error_estimate
    }

    /// Number of cached peers.
    pub fn known_peers(&self) -> usize {
        self.state.read().peers.len()
    }

    /// Full view of the peer cache. Does not touch dirty flags.
    pub fn peers_snapshot(&self) -> HashMap<Guid, PeerDelta<S>> {
        self.state
            .read()
            .peers
            .iter()
            .map(|(guid, entry)| {
                let delta = PeerDelta {
                    is_failed: entry.is_failed,
                    coordinates: entry.coordinates.coordinates().to_vec(),
                };
                (*guid, delta)
            })
            .collect()
    }

    /// Cached candidates at minimum modelled distance from this node.
    ///
    /// Unknown guids are skipped, ties are all returned, and failed peers are
    /// not filtered out.
    pub fn closest_of(&self, candidates: &[Guid]) -> Result<BTreeSet<Guid>> {
        let state = self.state.read();
        let mut best = f64::INFINITY;
        let mut closest = BTreeSet::new();

        for guid in candidates {
            let Some(entry) = state.peers.get(guid) else {
                continue;
            };
            let distance = self.space.distance(&state.my_coordinates, &entry.coordinates)?;

            if distance < best {
                best = distance;
                closest.clear();
                closest.insert(*guid);
            } else if distance == best {
                closest.insert(*guid);
            }
        }

        Ok(closest)
    }

    /// Cached failure flag; `None` for a peer never seen.
    pub fn peer_status(&self, guid: &Guid) -> Option<bool> {
        self.state.read().peers.get(guid).map(|entry| entry.is_failed)
    }

    /// Whether `guid` is known and flagged failed. Unknown peers read as healthy.
    pub fn is_failed(&self, guid: &Guid) -> bool {
        self.peer_status(guid).unwrap_or(false)
    }

    /// Modelled RTT to a cached peer, in milliseconds.
    pub fn estimate_rtt(&self, guid: &Guid) -> Result<f64> {
        let state = self.state.read();
        let entry = state.peers.get(guid).ok_or(CoreError::UnknownPeer(*guid))?;
        Ok(self.space.distance(&state.my_coordinates, &entry.coordinates)?)
    }

    /// Export own coordinates and every dirty entry, clearing the flags.
    pub fn state_updates(&self) -> StateUpdates<S> {
        let session = self.session();
        let mut state = self.state.write();

        let mut entries = HashMap::new();
        entries.insert(
            self.guid,
            PeerDelta {
                is_failed: false,
                coordinates: state.my_coordinates.coordinates().to_vec(),
            },
        );

        for (guid, entry) in state.peers.iter_mut().filter(|(_, e)| e.dirty) {
            entries.insert(
                *guid,
                PeerDelta {
                    is_failed: entry.is_failed,
                    coordinates: entry.coordinates.coordinates().to_vec(),
                },
            );
            entry.dirty = false;
        }

        StateUpdates {
            session,
            origin: self.guid,
            error_estimate: state.error_estimate,
            entries,
        }
    }

    /// Own guid, coordinates and error estimate.
    pub fn my_state(&self) -> PeerState<S> {
        let state = self.state.read();
        PeerState {
            guid: self.guid,
            coordinates: state.my_coordinates.coordinates().to_vec(),
            error_estimate: state.error_estimate,
        }
    }

    /// Merge an inbound update, then run the Vivaldi step.
    ///
    /// New peers are cached as delivered. For known peers the failure flag is
    /// always overlaid, but coordinates are replaced only for the
    /// communicator: relayed positions are second-hand and carry no version to
    /// compare against. Entries with bad dimensions are skipped and reported
    /// together as [`CoreError::PartialMerge`] once everything else is merged.
    /// A non-finite or negative error estimate, or a non-finite coordinate,
    /// rejects the whole message as [`CoreError::BadPayload`].
    pub fn update_state(&self, message: GossipMessage<S>) -> Result<()> {
        message.validate()?;
        self.check_session(message.session)?;

        let mut guard = self.state.write();
        // set_session may have run between the check and taking the state lock
        self.check_session(message.session)?;
        let state = &mut *guard;
        let mut rejected: Vec<(Guid, SpaceError)> = Vec::new();

        for (guid, delta) in message.deltas {
            if guid == self.guid {
                continue;
            }

            match state.peers.get_mut(&guid) {
                Some(entry) => {
                    entry.is_failed = delta.is_failed;
                    if guid == message.communicator {
                        if let Err(e) = entry.coordinates.set_coordinates(delta.coordinates) {
                            rejected.push((guid, e));
                        }
                    }
                    entry.dirty = true;
                }
                None => match Point::new(&self.space, delta.coordinates) {
                    Ok(coordinates) => {
                        trace!(peer = %guid, "caching new peer");
                        state.peers.insert(
                            guid,
                            PeerEntry {
                                coordinates,
                                is_failed: delta.is_failed,
                                dirty: true,
                            },
                        );
                    }
                    Err(e) => rejected.push((guid, e)),
                },
            }
        }

        let step = self.vivaldi_update(
            state,
            message.measured_rtt,
            message.sender_error_estimate,
            message.communicator,
        );
        drop(guard);

        match step {
            Err(error) => {
                warn!(sender = %message.sender, %error, rejected = rejected.len(), "coordinate step failed");
                Err(CoreError::StepFailed { error, rejected })
            }
            Ok(()) if rejected.is_empty() => Ok(()),
            Ok(()) => {
                warn!(sender = %message.sender, rejected = rejected.len(), "partial merge");
                Err(CoreError::PartialMerge(rejected))
            }
        }
    }

    fn check_session(&self, received: Guid) -> Result<()> {
        let expected = self.session();
        if received == expected {
            Ok(())
        } else {
            Err(CoreError::SessionMismatch { expected, received })
        }
    }

    fn vivaldi_update(
        &self,
        state: &mut CoreState<S>,
        rtt: f64,
        ej: f64,
        communicator: Guid,
    ) -> std::result::Result<(), SpaceError> {
        let Some(remote) = state.peers.get(&communicator) else {
            trace!(peer = %communicator, "communicator not cached, skipping step");
            return Ok(());
        };
        if !(rtt > 0.0 && rtt.is_finite()) {
            trace!(peer = %communicator, rtt, "unusable rtt sample, skipping step");
            return Ok(());
        }

        let ei = state.error_estimate;
        let w = if ei + ej != 0.0 { ei / (ei + ej) } else { ZERO_ERROR_WEIGHT };

        let dist = self.space.distance(&state.my_coordinates, &remote.coordinates)?;
        let e = rtt - dist;
        let es = e.abs() / rtt;

        let ce_w = self.tuning.ce * w;
        state.error_estimate = (es * ce_w + ei * (1.0 - ce_w)).max(0.0);

        let delta = self.tuning.cc * w;
        let unit = self.space.unit_vector(&state.my_coordinates, &remote.coordinates)?;
        let force = self.space.external_mul(&unit, e * delta)?;
        let moved = self.space.translate(&state.my_coordinates, &force)?;

        trace!(
            peer = %communicator,
            w, dist, e, es, delta,
            ei = state.error_estimate,
            "vivaldi step"
        );
        state.my_coordinates = moved;
        Ok(())
    }

    /// Flag known peers as failed. Unknown guids are ignored.
    pub fn signal_failed(&self, peers: &[Guid]) {
        if peers.is_empty() {
            return;
        }
        let mut state = self.state.write();
        for guid in peers {
            if let Some(entry) = state.peers.get_mut(guid) {
                entry.is_failed = true;
                entry.dirty = true;
            }
        }
        debug!(count = peers.len(), "peers signalled failed");
    }

    /// Register a queue for inbound pushes (see [`ChannelSubject`]).
    pub fn bus(&self) -> &ChannelBus<ForwardCandidate<S>> {
        &self.bus
    }
}

impl<S: Support> CoreGate<S> for CoordinateCore<S> {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn session(&self) -> Guid {
        CoordinateCore::session(self)
    }

    fn state_updates(&self) -> Result<StateUpdates<S>> {
        Ok(CoordinateCore::state_updates(self))
    }

    fn my_state(&self) -> PeerState<S> {
        CoordinateCore::my_state(self)
    }

    fn update_state(&self, message: GossipMessage<S>) -> Result<()> {
        CoordinateCore::update_state(self, message)
    }

    fn signal_failed(&self, peers: &[Guid]) {
        CoordinateCore::signal_failed(self, peers)
    }
}

impl<S: Support> ChannelSubject<ForwardCandidate<S>> for CoordinateCore<S> {
    fn register_channel(&self, sender: UnboundedSender<ForwardCandidate<S>>) -> ChannelId {
        self.bus.register_channel(sender)
    }

    fn unregister_channel(&self, id: ChannelId) -> bool {
        self.bus.unregister_channel(id)
    }

    fn push_to_channels(&self, event: ForwardCandidate<S>) {
        self.bus.push_to_channels(event)
    }
}
